//! MiniMax image-01 provider.

use crate::credentials::CredentialResolver;
use crate::error::{ImageGateError, Result};
use crate::image::exchange;
use crate::image::provider::{ImageProvider, ProviderContext};
use crate::image::types::{GenerateImageParams, ImageSize, ProviderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public API base.
pub const DEFAULT_BASE_URL: &str = "https://api.minimax.io/v1";

const ASPECT_RATIOS: &[(&str, f64)] = &[
    ("1:1", 1.0),
    ("4:3", 4.0 / 3.0),
    ("3:4", 3.0 / 4.0),
    ("16:9", 16.0 / 9.0),
    ("9:16", 9.0 / 16.0),
    ("9:7", 9.0 / 7.0),
    ("7:9", 7.0 / 9.0),
];

/// MiniMax image generation provider.
pub struct MinimaxProvider {
    context: ProviderContext,
    base_url: String,
}

impl MinimaxProvider {
    /// Creates a provider against the public endpoint.
    pub fn new(context: ProviderContext) -> Self {
        Self {
            context,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// First ratio label within 0.1 of `width / height`, `1:1` otherwise.
    pub fn aspect_ratio_label(width: u32, height: u32) -> &'static str {
        let ratio = ImageSize::new(width, height).ratio();
        ASPECT_RATIOS
            .iter()
            .find(|(_, r)| (ratio - r).abs() < 0.1)
            .map_or("1:1", |(label, _)| *label)
    }

    async fn request_image(&self, params: &GenerateImageParams) -> Result<String> {
        exchange::require_model(&params.model)?;
        let api_key = self.api_key();
        let url = exchange::join_url(&self.base_url, "/image_generation");
        let sink = params.sink.as_ref();

        let size = ImageSize::parse(&params.image_size)?;
        let body = MinimaxRequest {
            model: &params.model,
            prompt: &params.prompt,
            aspect_ratio: Self::aspect_ratio_label(size.width, size.height),
            response_format: "url",
            n: 1,
            prompt_optimizer: true,
        };
        exchange::log_request(
            sink,
            &url,
            "POST",
            exchange::masked_bearer_headers(&api_key),
            serde_json::to_value(&body)?,
        );

        let response = self
            .context
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await?;
        let data = exchange::read_json(sink, response).await?;
        exchange::log_response(sink, &data);

        exchange::decode::<MinimaxResponse>(&data)
            .and_then(|r| r.data)
            .and_then(|d| d.image_urls.into_iter().next())
            .ok_or(ImageGateError::MissingImageUrl)
    }
}

#[async_trait]
impl ImageProvider for MinimaxProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Minimax
    }

    fn credentials(&self) -> &CredentialResolver {
        &self.context.credentials
    }

    async fn generate_image(&self, params: &GenerateImageParams) -> Result<String> {
        self.request_image(params)
            .await
            .inspect_err(|e| exchange::log_unlogged(params.sink.as_ref(), e))
    }

    fn model_sizes(&self, _model: &str) -> Vec<ImageSize> {
        vec![
            ImageSize::new(1024, 1024),
            ImageSize::new(1024, 768),
            ImageSize::new(768, 1024),
            ImageSize::new(1280, 720),
            ImageSize::new(720, 1280),
            ImageSize::new(1152, 896),
            ImageSize::new(896, 1152),
        ]
    }
}

#[derive(Debug, Serialize)]
struct MinimaxRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    aspect_ratio: &'static str,
    response_format: &'static str,
    n: u32,
    prompt_optimizer: bool,
}

#[derive(Debug, Deserialize)]
struct MinimaxResponse {
    #[serde(default)]
    data: Option<MinimaxData>,
}

#[derive(Debug, Deserialize)]
struct MinimaxData {
    #[serde(default)]
    image_urls: Vec<String>,
}

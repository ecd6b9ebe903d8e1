//! Baidu Qianfan provider (irag-1.0, flux.1-schnell).

use crate::credentials::CredentialResolver;
use crate::error::{ImageGateError, Result};
use crate::image::exchange;
use crate::image::provider::{ImageProvider, ProviderContext};
use crate::image::types::{GenerateImageParams, ImageSize, ProviderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public API base.
pub const DEFAULT_BASE_URL: &str = "https://qianfan.baidubce.com/v2";

/// Qianfan image generation provider.
pub struct QianfanProvider {
    context: ProviderContext,
    base_url: String,
}

impl QianfanProvider {
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

    async fn request_image(&self, params: &GenerateImageParams) -> Result<String> {
        exchange::require_model(&params.model)?;
        let api_key = self.api_key();
        let url = exchange::join_url(&self.base_url, "/images/generations");
        let sink = params.sink.as_ref();

        let body = QianfanRequest {
            model: &params.model,
            prompt: &params.prompt,
            size: &params.image_size,
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

        exchange::decode::<QianfanResponse>(&data)
            .and_then(|r| r.data.into_iter().next())
            .and_then(|image| image.url)
            .ok_or(ImageGateError::MissingImageUrl)
    }
}

#[async_trait]
impl ImageProvider for QianfanProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Qianfan
    }

    fn credentials(&self) -> &CredentialResolver {
        &self.context.credentials
    }

    async fn generate_image(&self, params: &GenerateImageParams) -> Result<String> {
        self.request_image(params)
            .await
            .inspect_err(|e| exchange::log_unlogged(params.sink.as_ref(), e))
    }

    fn model_sizes(&self, model: &str) -> Vec<ImageSize> {
        match model {
            "irag-1.0" => vec![
                ImageSize::new(512, 512),
                ImageSize::new(768, 768),
                ImageSize::new(1024, 1024),
            ],
            "flux.1-schnell" => vec![
                ImageSize::new(512, 512),
                ImageSize::new(768, 768),
                ImageSize::new(1024, 1024),
                ImageSize::new(512, 768),
                ImageSize::new(768, 512),
            ],
            _ => vec![ImageSize::SQUARE_1024],
        }
    }
}

#[derive(Debug, Serialize)]
struct QianfanRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct QianfanResponse {
    #[serde(default)]
    data: Vec<QianfanImage>,
}

#[derive(Debug, Deserialize)]
struct QianfanImage {
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn provider() -> QianfanProvider {
        QianfanProvider::new(ProviderContext::new(Arc::new(
            CredentialResolver::in_memory(),
        )))
    }

    #[test]
    fn test_sizes_per_model() {
        let p = provider();
        assert_eq!(p.supported_sizes("irag-1.0").len(), 3);
        assert_eq!(p.supported_sizes("flux.1-schnell").len(), 5);
        assert_eq!(p.supported_sizes("other"), vec![ImageSize::SQUARE_1024]);
    }

    #[test]
    fn test_recommended_size_flux() {
        let p = provider();
        assert_eq!(p.recommended_size("flux.1-schnell", 1.5), ImageSize::new(768, 512));
        assert_eq!(p.recommended_size("flux.1-schnell", 0.66), ImageSize::new(512, 768));
        assert_eq!(p.recommended_size("irag-1.0", 0.5), ImageSize::new(512, 512));
    }

    #[test]
    fn test_request_has_no_n() {
        let body = QianfanRequest {
            model: "irag-1.0",
            prompt: "p",
            size: "768x768",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("n").is_none());
        assert_eq!(json["size"], "768x768");
    }
}

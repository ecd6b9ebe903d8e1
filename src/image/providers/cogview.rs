//! Zhipu AI CogView provider (synchronous URL response).

use crate::credentials::CredentialResolver;
use crate::error::{ImageGateError, Result};
use crate::image::exchange;
use crate::image::provider::{ImageProvider, ProviderContext};
use crate::image::types::{GenerateImageParams, ProviderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public API base.
pub const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";

/// CogView image generation provider.
pub struct CogviewProvider {
    context: ProviderContext,
    base_url: String,
}

impl CogviewProvider {
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

        let body = CogviewRequest {
            model: &params.model,
            prompt: &params.prompt,
            n: 1,
            size: &params.image_size,
            response_format: "url",
            style: "vivid",
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

        exchange::decode::<CogviewResponse>(&data)
            .and_then(|r| r.data.into_iter().next())
            .and_then(|image| image.url)
            .ok_or(ImageGateError::MissingImageUrl)
    }
}

#[async_trait]
impl ImageProvider for CogviewProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Cogview
    }

    fn credentials(&self) -> &CredentialResolver {
        &self.context.credentials
    }

    async fn generate_image(&self, params: &GenerateImageParams) -> Result<String> {
        self.request_image(params)
            .await
            .inspect_err(|e| exchange::log_unlogged(params.sink.as_ref(), e))
    }
}

#[derive(Debug, Serialize)]
struct CogviewRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'static str,
    style: &'static str,
}

#[derive(Debug, Deserialize)]
struct CogviewResponse {
    #[serde(default)]
    data: Vec<CogviewImage>,
}

#[derive(Debug, Deserialize)]
struct CogviewImage {
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageSize;
    use std::sync::Arc;

    fn provider() -> CogviewProvider {
        CogviewProvider::new(ProviderContext::new(Arc::new(
            CredentialResolver::in_memory(),
        )))
    }

    #[test]
    fn test_request_serialization() {
        let body = CogviewRequest {
            model: "cogview-4",
            prompt: "a lighthouse",
            n: 1,
            size: "1024x1024",
            response_format: "url",
            style: "vivid",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "cogview-4");
        assert_eq!(json["n"], 1);
        assert_eq!(json["response_format"], "url");
        assert_eq!(json["style"], "vivid");
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{"created": 1, "data": [{"url": "https://x/img.png"}]}"#;
        let resp: CogviewResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].url.as_deref(), Some("https://x/img.png"));
    }

    #[test]
    fn test_supported_sizes() {
        let p = provider();
        assert_eq!(p.supported_sizes("cogview-4"), vec![ImageSize::SQUARE_1024]);
        assert_eq!(p.supported_sizes(""), vec![ImageSize::SQUARE_1024]);
        assert!(p.is_image_size_supported("cogview-4", 1024, 1024));
        assert!(!p.is_image_size_supported("cogview-4", 768, 768));
    }

    #[test]
    fn test_key_roundtrip() {
        let p = provider();
        p.set_api_key("zp.key").unwrap();
        assert_eq!(p.api_key(), "zp.key");
        assert_eq!(p.name(), "Zhipu AI CogView");
    }
}

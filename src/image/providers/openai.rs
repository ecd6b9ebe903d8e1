//! OpenAI image generation provider (gpt-image-1, dall-e-3, dall-e-2).

use crate::credentials::CredentialResolver;
use crate::error::{ImageGateError, Result};
use crate::image::exchange;
use crate::image::provider::{recommend_size, ImageProvider, ProviderContext, SizePolicy};
use crate::image::types::{GenerateImageParams, ImageSize, ProviderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const GPT_IMAGE_SIZES: [ImageSize; 3] = [
    ImageSize::new(1024, 1024),
    ImageSize::new(1536, 1024),
    ImageSize::new(1024, 1536),
];

const DALLE3_SIZES: [ImageSize; 3] = [
    ImageSize::new(1024, 1024),
    ImageSize::new(1792, 1024),
    ImageSize::new(1024, 1792),
];

const DALLE2_SIZES: [ImageSize; 3] = [
    ImageSize::new(256, 256),
    ImageSize::new(512, 512),
    ImageSize::new(1024, 1024),
];

/// OpenAI image model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiImageFamily {
    /// `gpt-image-1*`, quality from a `-high`/`-medium`/`-low` suffix.
    GptImage1,
    /// `dall-e-3*`, quality from a `-hd`/`-standard` suffix.
    DallE3,
    /// `dall-e-2`.
    DallE2,
}

impl OpenAiImageFamily {
    /// Family of a catalog model id.
    pub fn from_model(model: &str) -> Option<Self> {
        if model.starts_with("gpt-image-1") {
            Some(Self::GptImage1)
        } else if model.starts_with("dall-e-3") {
            Some(Self::DallE3)
        } else if model == "dall-e-2" {
            Some(Self::DallE2)
        } else {
            None
        }
    }

    /// Returns the API model identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GptImage1 => "gpt-image-1",
            Self::DallE3 => "dall-e-3",
            Self::DallE2 => "dall-e-2",
        }
    }

    /// Fixed size menu.
    pub fn sizes(&self) -> &'static [ImageSize] {
        match self {
            Self::GptImage1 => &GPT_IMAGE_SIZES,
            Self::DallE3 => &DALLE3_SIZES,
            Self::DallE2 => &DALLE2_SIZES,
        }
    }
}

/// Quality tier of `model`, if its family has tiers.
pub fn quality_for(model: &str) -> Option<&'static str> {
    match OpenAiImageFamily::from_model(model)? {
        OpenAiImageFamily::GptImage1 => Some(match model {
            "gpt-image-1-high" => "high",
            "gpt-image-1-low" => "low",
            _ => "medium",
        }),
        OpenAiImageFamily::DallE3 => Some(if model == "dall-e-3-hd" { "hd" } else { "standard" }),
        OpenAiImageFamily::DallE2 => None,
    }
}

/// Maps a requested size onto the family's menu.
///
/// gpt-image-1 and dall-e-3 pick by orientation; dall-e-2 picks the
/// smallest square covering the larger side. Unknown models get 1024x1024.
pub fn resolve_size(model: &str, width: u32, height: u32) -> ImageSize {
    match OpenAiImageFamily::from_model(model) {
        Some(OpenAiImageFamily::DallE2) => {
            let side = match width.max(height) {
                0..=256 => 256,
                257..=512 => 512,
                _ => 1024,
            };
            ImageSize::new(side, side)
        }
        Some(family) => recommend_size(family.sizes(), ImageSize::new(width, height).ratio()),
        None => ImageSize::SQUARE_1024,
    }
}

/// OpenAI image generation provider.
pub struct OpenAiImageProvider {
    context: ProviderContext,
    base_url: String,
}

impl OpenAiImageProvider {
    /// Creates a provider against `OPENAI_API_BASE_URL` or the public API.
    pub fn new(context: ProviderContext) -> Self {
        Self {
            context,
            base_url: crate::config::openai_base_url(),
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
        let url = exchange::join_url(&self.base_url, "/v1/images/generations");
        let sink = params.sink.as_ref();

        let size = ImageSize::parse(&params.image_size)?;
        let body = OpenAiImageRequest::for_model(&params.model, &params.prompt, size);
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

        let image = exchange::decode::<OpenAiImageResponse>(&data)
            .and_then(|r| r.data.into_iter().next())
            .ok_or(ImageGateError::MissingImageUrl)?;

        // Handle url or b64_json response formats
        if let Some(url) = image.url.filter(|u| !u.is_empty()) {
            Ok(url)
        } else if let Some(b64) = image.b64_json.filter(|b| !b.is_empty()) {
            Ok(format!("data:image/png;base64,{b64}"))
        } else {
            Err(ImageGateError::MissingImageUrl)
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
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
        OpenAiImageFamily::from_model(model)
            .map(|family| family.sizes().to_vec())
            .unwrap_or_else(|| vec![ImageSize::SQUARE_1024])
    }

    fn size_policy(&self) -> SizePolicy {
        SizePolicy::Enumerated
    }
}

#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: &'static str,
    prompt: String,
    n: u32,
    size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'static str>,
}

impl OpenAiImageRequest {
    fn for_model(model: &str, prompt: &str, requested: ImageSize) -> Self {
        let family = OpenAiImageFamily::from_model(model);
        let size = resolve_size(model, requested.width, requested.height);
        // gpt-image-1 rejects response_format
        let (style, response_format) = match family {
            Some(OpenAiImageFamily::DallE3) => (Some("vivid"), Some("url")),
            Some(OpenAiImageFamily::DallE2) => (None, Some("url")),
            _ => (None, None),
        };
        Self {
            model: family.map_or("dall-e-3", |f| f.as_str()),
            prompt: prompt.to_string(),
            n: 1,
            size: size.to_string(),
            quality: quality_for(model),
            style,
            response_format,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    #[serde(default)]
    data: Vec<OpenAiImageData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn provider() -> OpenAiImageProvider {
        OpenAiImageProvider::new(ProviderContext::new(Arc::new(
            CredentialResolver::in_memory(),
        )))
    }

    #[test]
    fn test_family_dispatch() {
        assert_eq!(
            OpenAiImageFamily::from_model("gpt-image-1-high"),
            Some(OpenAiImageFamily::GptImage1)
        );
        assert_eq!(
            OpenAiImageFamily::from_model("dall-e-3-standard"),
            Some(OpenAiImageFamily::DallE3)
        );
        assert_eq!(
            OpenAiImageFamily::from_model("dall-e-2"),
            Some(OpenAiImageFamily::DallE2)
        );
        assert_eq!(OpenAiImageFamily::from_model("dall-e-2-mini"), None);
    }

    #[test]
    fn test_quality_from_suffix() {
        assert_eq!(quality_for("gpt-image-1-high"), Some("high"));
        assert_eq!(quality_for("gpt-image-1-low"), Some("low"));
        assert_eq!(quality_for("gpt-image-1"), Some("medium"));
        assert_eq!(quality_for("dall-e-3-hd"), Some("hd"));
        assert_eq!(quality_for("dall-e-3-standard"), Some("standard"));
        assert_eq!(quality_for("dall-e-2"), None);
    }

    #[test]
    fn test_size_mapping_dalle3_landscape() {
        // 1.6 aspect ratio
        assert_eq!(resolve_size("dall-e-3-hd", 1600, 1000), ImageSize::new(1792, 1024));
    }

    #[test]
    fn test_size_mapping_gpt_image_portrait() {
        // 0.6 aspect ratio
        assert_eq!(resolve_size("gpt-image-1-low", 600, 1000), ImageSize::new(1024, 1536));
    }

    #[test]
    fn test_size_mapping_dalle2_max_dimension() {
        assert_eq!(resolve_size("dall-e-2", 300, 200), ImageSize::new(512, 512));
        assert_eq!(resolve_size("dall-e-2", 256, 256), ImageSize::new(256, 256));
        assert_eq!(resolve_size("dall-e-2", 900, 513), ImageSize::new(1024, 1024));
    }

    #[test]
    fn test_size_mapping_near_square() {
        assert_eq!(resolve_size("gpt-image-1-medium", 1050, 1000), ImageSize::new(1024, 1024));
    }

    #[test]
    fn test_request_gpt_image_has_no_response_format() {
        let req =
            OpenAiImageRequest::for_model("gpt-image-1-high", "p", ImageSize::new(1536, 1024));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-image-1");
        assert_eq!(json["size"], "1536x1024");
        assert_eq!(json["quality"], "high");
        assert!(json.get("response_format").is_none());
        assert!(json.get("style").is_none());
    }

    #[test]
    fn test_request_dalle3_shape() {
        let req =
            OpenAiImageRequest::for_model("dall-e-3-standard", "p", ImageSize::new(1024, 1792));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "dall-e-3");
        assert_eq!(json["quality"], "standard");
        assert_eq!(json["style"], "vivid");
        assert_eq!(json["response_format"], "url");
        assert_eq!(json["size"], "1024x1792");
    }

    #[test]
    fn test_request_unknown_family_falls_back() {
        let req = OpenAiImageRequest::for_model("dall-e-9", "p", ImageSize::new(512, 512));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "dall-e-3");
        assert_eq!(json["size"], "1024x1024");
        assert!(json.get("quality").is_none());
    }

    #[test]
    fn test_supported_sizes() {
        let p = provider();
        assert_eq!(p.supported_sizes("dall-e-2"), DALLE2_SIZES.to_vec());
        assert_eq!(p.supported_sizes(""), vec![ImageSize::SQUARE_1024]);
        assert!(p.is_image_size_supported("dall-e-3-hd", 1792, 1024));
        assert!(!p.is_image_size_supported("dall-e-3-hd", 1536, 1024));
        assert_eq!(p.size_policy(), SizePolicy::Enumerated);
    }

    #[test]
    fn test_recommended_size() {
        let p = provider();
        assert_eq!(p.recommended_size("gpt-image-1-high", 1.0), ImageSize::new(1024, 1024));
        assert_eq!(p.recommended_size("gpt-image-1-high", 2.0), ImageSize::new(1536, 1024));
        assert_eq!(p.recommended_size("gpt-image-1-high", 0.5), ImageSize::new(1024, 1536));
        assert_eq!(p.recommended_size("dall-e-2", 2.0), ImageSize::new(256, 256));
    }

    #[test]
    fn test_response_deserialization_b64() {
        let json = r#"{"data": [{"b64_json": "AQID"}]}"#;
        let resp: OpenAiImageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].b64_json.as_deref(), Some("AQID"));
        assert!(resp.data[0].url.is_none());
    }
}

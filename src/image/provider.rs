//! Image provider trait and shared provider plumbing.

use crate::config::ModelProviderConfig;
use crate::credentials::CredentialResolver;
use crate::error::Result;
use crate::image::blob::BlobStore;
use crate::image::sleep::{Sleeper, TokioSleeper};
use crate::image::types::{GenerateImageParams, ImageSize, ProviderId};
use async_trait::async_trait;
use std::sync::Arc;

/// How a provider constrains image sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    /// Only the sizes returned by [`ImageProvider::supported_sizes`].
    Enumerated,
    /// Any size passing the generic range, step and pixel-budget rule; the
    /// supported list is only a menu of suggestions.
    Flexible,
}

/// Collaborators shared by every provider built by one registry.
#[derive(Clone)]
pub struct ProviderContext {
    /// HTTP client.
    pub client: reqwest::Client,
    /// Credential chain.
    pub credentials: Arc<CredentialResolver>,
    /// Suspend point for polling and backoff.
    pub sleeper: Arc<dyn Sleeper>,
    /// Object URLs for inline image payloads.
    pub blobs: Arc<BlobStore>,
}

impl ProviderContext {
    /// Context with a fresh client, a real sleeper and an empty blob store.
    pub fn new(credentials: Arc<CredentialResolver>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            sleeper: Arc::new(TokioSleeper),
            blobs: Arc::new(BlobStore::new()),
        }
    }

    /// Replaces the sleeper.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replaces the HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

/// Trait for image generation providers.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Returns the id of this provider.
    fn id(&self) -> ProviderId;

    /// Credential chain the provider reads its key from.
    fn credentials(&self) -> &CredentialResolver;

    /// Generates one image and returns a displayable URL (remote, `data:`
    /// or `blob:`).
    async fn generate_image(&self, params: &GenerateImageParams) -> Result<String>;

    /// Static configuration.
    fn config(&self) -> &'static ModelProviderConfig {
        self.id().config()
    }

    /// Returns the name of this provider for display.
    fn name(&self) -> &'static str {
        self.config().name
    }

    /// Current API key, empty if none is configured.
    fn api_key(&self) -> String {
        self.credentials().api_key(self.config().api_key_name)
    }

    /// Stores an API key. Ignored when the key is pinned by configuration.
    fn set_api_key(&self, key: &str) -> Result<()> {
        self.credentials()
            .set_api_key(self.config().api_key_name, key)
    }

    /// Sizes for a non-empty model id.
    fn model_sizes(&self, _model: &str) -> Vec<ImageSize> {
        vec![ImageSize::SQUARE_1024]
    }

    /// Valid sizes for `model`; `[1024x1024]` for an empty id.
    fn supported_sizes(&self, model: &str) -> Vec<ImageSize> {
        if model.trim().is_empty() {
            return vec![ImageSize::SQUARE_1024];
        }
        self.model_sizes(model)
    }

    /// Returns true iff `width`x`height` is listed for `model`.
    fn is_image_size_supported(&self, model: &str, width: u32, height: u32) -> bool {
        self.supported_sizes(model)
            .contains(&ImageSize::new(width, height))
    }

    /// Picks the listed size that best matches `aspect_ratio`.
    fn recommended_size(&self, model: &str, aspect_ratio: f64) -> ImageSize {
        recommend_size(&self.supported_sizes(model), aspect_ratio)
    }

    /// Size constraint style.
    fn size_policy(&self) -> SizePolicy {
        SizePolicy::Flexible
    }
}

/// Near-square ratios prefer a square entry, wider ratios the first
/// landscape entry, taller ones the first portrait entry. Falls back to the
/// first entry, or 1024x1024 for an empty list.
pub fn recommend_size(sizes: &[ImageSize], aspect_ratio: f64) -> ImageSize {
    let preferred = if (aspect_ratio - 1.0).abs() < 0.1 {
        sizes.iter().find(|s| s.is_square())
    } else if aspect_ratio > 1.0 {
        sizes.iter().find(|s| s.is_landscape())
    } else {
        sizes.iter().find(|s| s.is_portrait())
    };
    preferred
        .or_else(|| sizes.first())
        .copied()
        .unwrap_or(ImageSize::SQUARE_1024)
}

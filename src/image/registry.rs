//! Model-id dispatch and the memoizing provider registry.

use crate::credentials::CredentialResolver;
use crate::error::{ImageGateError, Result};
use crate::image::blob::BlobStore;
use crate::image::provider::{ImageProvider, ProviderContext};
use crate::image::providers::{
    CogviewProvider, MinimaxProvider, OpenAiImageProvider, QianfanProvider, VolcengineProvider,
    WanxProvider,
};
use crate::image::sleep::Sleeper;
use crate::image::types::ProviderId;
use crate::storage::MemoryStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// How a dispatch rule matches a model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMatch {
    /// Model id starts with the pattern.
    Prefix(&'static str),
    /// Model id equals the pattern.
    Exact(&'static str),
}

impl ModelMatch {
    /// Returns true if `model` satisfies this rule.
    pub fn matches(&self, model: &str) -> bool {
        match self {
            Self::Prefix(prefix) => model.starts_with(prefix),
            Self::Exact(id) => model == *id,
        }
    }
}

/// Dispatch rules in priority order; the first match wins.
pub const DISPATCH: &[(ModelMatch, ProviderId)] = &[
    (ModelMatch::Prefix("cogview-"), ProviderId::Cogview),
    (ModelMatch::Prefix("gpt-image-1"), ProviderId::OpenAi),
    (ModelMatch::Prefix("dall-e-"), ProviderId::OpenAi),
    (ModelMatch::Prefix("wanx2"), ProviderId::Wanx),
    (ModelMatch::Exact("irag-1.0"), ProviderId::Qianfan),
    (ModelMatch::Exact("flux.1-schnell"), ProviderId::Qianfan),
    (ModelMatch::Prefix("doubaoimg-"), ProviderId::Doubao),
    (ModelMatch::Exact("image-01"), ProviderId::Minimax),
];

/// Maps a model id to the provider that serves it.
///
/// Fails with [`ImageGateError::InvalidModel`] for a blank id and
/// [`ImageGateError::UnsupportedModel`] when no rule matches.
pub fn resolve_provider_id(model: &str) -> Result<ProviderId> {
    if model.trim().is_empty() {
        return Err(ImageGateError::InvalidModel(model.to_string()));
    }
    DISPATCH
        .iter()
        .find(|(rule, _)| rule.matches(model))
        .map(|(_, id)| *id)
        .ok_or_else(|| ImageGateError::UnsupportedModel(model.to_string()))
}

/// Builder for [`ProviderRegistry`].
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    credentials: Option<Arc<CredentialResolver>>,
    client: Option<reqwest::Client>,
    sleeper: Option<Arc<dyn Sleeper>>,
    base_urls: HashMap<ProviderId, String>,
}

impl ProviderRegistryBuilder {
    /// Creates a builder with default collaborators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credential chain shared by every provider.
    pub fn credentials(mut self, credentials: Arc<CredentialResolver>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// HTTP client shared by every provider.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Suspend point for polling and retry backoff.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Overrides the API base URL of one provider.
    pub fn base_url(mut self, id: ProviderId, url: impl Into<String>) -> Self {
        self.base_urls.insert(id, url.into());
        self
    }

    /// Builds the registry. Without explicit credentials the chain reads
    /// the environment first, then an in-memory store.
    pub fn build(self) -> ProviderRegistry {
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(CredentialResolver::new(Arc::new(MemoryStore::new()))));
        let mut context = ProviderContext::new(credentials);
        if let Some(client) = self.client {
            context = context.with_client(client);
        }
        if let Some(sleeper) = self.sleeper {
            context = context.with_sleeper(sleeper);
        }
        ProviderRegistry {
            context,
            base_urls: self.base_urls,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

/// Lazily creates one provider instance per provider id and hands out the
/// same instance for every model that provider serves.
pub struct ProviderRegistry {
    context: ProviderContext,
    base_urls: HashMap<ProviderId, String>,
    cache: Mutex<HashMap<ProviderId, Arc<dyn ImageProvider>>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProviderRegistry {
    /// Registry with default collaborators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new builder.
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::new()
    }

    /// Maps a model id to its provider id.
    pub fn resolve_provider_id(&self, model: &str) -> Result<ProviderId> {
        resolve_provider_id(model)
    }

    /// Provider serving `model`.
    pub fn resolve(&self, model: &str) -> Result<Arc<dyn ImageProvider>> {
        let id = resolve_provider_id(model)?;
        Ok(self.provider(id))
    }

    /// Provider for `id`, created on first use.
    pub fn provider(&self, id: ProviderId) -> Arc<dyn ImageProvider> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(provider = %id, "creating provider instance");
                self.create(id)
            })
            .clone()
    }

    /// Every provider, in catalog order.
    pub fn all_providers(&self) -> Vec<Arc<dyn ImageProvider>> {
        ProviderId::ALL.into_iter().map(|id| self.provider(id)).collect()
    }

    /// Replaces the instance served for `id`.
    pub fn insert(&self, id: ProviderId, provider: Arc<dyn ImageProvider>) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, provider);
    }

    /// Object URLs created by providers of this registry.
    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.context.blobs
    }

    /// Credential chain shared by providers of this registry.
    pub fn credentials(&self) -> &Arc<CredentialResolver> {
        &self.context.credentials
    }

    /// Collaborators handed to every provider.
    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    fn create(&self, id: ProviderId) -> Arc<dyn ImageProvider> {
        let context = self.context.clone();
        let base = self.base_urls.get(&id).cloned();
        match id {
            ProviderId::Cogview => {
                with_base(CogviewProvider::new(context), base, |p, url| p.with_base_url(url))
            }
            ProviderId::OpenAi => {
                with_base(OpenAiImageProvider::new(context), base, |p, url| p.with_base_url(url))
            }
            ProviderId::Wanx => {
                with_base(WanxProvider::new(context), base, |p, url| p.with_base_url(url))
            }
            ProviderId::Qianfan => {
                with_base(QianfanProvider::new(context), base, |p, url| p.with_base_url(url))
            }
            ProviderId::Doubao => {
                with_base(VolcengineProvider::new(context), base, |p, url| p.with_base_url(url))
            }
            ProviderId::Minimax => {
                with_base(MinimaxProvider::new(context), base, |p, url| p.with_base_url(url))
            }
        }
    }
}

fn with_base<P: ImageProvider + 'static>(
    provider: P,
    base: Option<String>,
    apply: fn(P, String) -> P,
) -> Arc<dyn ImageProvider> {
    Arc::new(match base {
        Some(url) => apply(provider, url),
        None => provider,
    })
}

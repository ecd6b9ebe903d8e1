//! Two-tier credential resolution.
//!
//! Read-only [`ConfigSource`]s are consulted first, in order; the mutable
//! [`KeyValueStore`] second. A key pinned by any source cannot be
//! overwritten through [`CredentialResolver::set_api_key`].

use crate::config;
use crate::error::Result;
use crate::storage::{KeyValueStore, MemoryStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only credential source.
pub trait ConfigSource: Send + Sync {
    /// Returns the credential for `key_name`, if this source defines one.
    fn get(&self, key_name: &str) -> Option<String>;
}

/// Reads credentials from the environment variables named by
/// [`config::env_var_for`]. Empty values count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigSource for EnvConfig {
    fn get(&self, key_name: &str) -> Option<String> {
        let var = config::env_var_for(key_name)?;
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Fixed in-memory credentials, e.g. from a deployment manifest.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    values: HashMap<String, String>,
}

impl StaticConfig {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pinned credential.
    pub fn with(mut self, key_name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key_name.into(), value.into());
        self
    }
}

impl ConfigSource for StaticConfig {
    fn get(&self, key_name: &str) -> Option<String> {
        self.values.get(key_name).filter(|v| !v.is_empty()).cloned()
    }
}

/// Priority-ordered credential chain.
pub struct CredentialResolver {
    sources: Vec<Arc<dyn ConfigSource>>,
    store: Arc<dyn KeyValueStore>,
}

impl CredentialResolver {
    /// Environment first, then `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sources: vec![Arc::new(EnvConfig)],
            store,
        }
    }

    /// No pinned sources; every key comes from `store`.
    pub fn store_only(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sources: Vec::new(),
            store,
        }
    }

    /// In-memory store without pinned sources.
    pub fn in_memory() -> Self {
        Self::store_only(Arc::new(MemoryStore::new()))
    }

    /// Appends a pinned source, consulted after the existing ones.
    pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Returns the pinned value for `key_name`, if any source has one.
    pub fn pinned(&self, key_name: &str) -> Option<String> {
        self.sources.iter().find_map(|s| s.get(key_name))
    }

    /// Returns true if a pinned source defines `key_name`.
    pub fn is_pinned(&self, key_name: &str) -> bool {
        self.pinned(key_name).is_some()
    }

    /// Resolves `key_name`; an unknown key resolves to an empty string.
    pub fn api_key(&self, key_name: &str) -> String {
        if let Some(value) = self.pinned(key_name) {
            return value;
        }
        match self.store.get(key_name) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(key_name, "failed to read credential: {e}");
                String::new()
            }
        }
    }

    /// Stores `key` under `key_name` unless a pinned source defines it.
    pub fn set_api_key(&self, key_name: &str, key: &str) -> Result<()> {
        if self.is_pinned(key_name) {
            tracing::debug!(key_name, "credential pinned by configuration, ignoring write");
            return Ok(());
        }
        self.store.set(key_name, key)
    }
}

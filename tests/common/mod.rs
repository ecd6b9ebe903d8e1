//! Shared fixtures for the wiremock-driven integration tests.

#![allow(dead_code)]

use imagegate::image::RecordingSleeper;
use imagegate::{
    CredentialResolver, GenerateImageParams, LogEntry, LogKind, LogStore, ProviderId,
    ProviderRegistry,
};
use std::sync::Arc;
use wiremock::MockServer;

/// Registry whose `id` provider talks to `server`, with `key` stored for it.
pub struct Harness {
    pub registry: ProviderRegistry,
    pub sleeper: Arc<RecordingSleeper>,
    pub logs: Arc<LogStore>,
}

impl Harness {
    pub fn new(server: &MockServer, id: ProviderId, key: &str) -> Self {
        let credentials = Arc::new(CredentialResolver::in_memory());
        credentials
            .set_api_key(id.config().api_key_name, key)
            .unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());
        let registry = ProviderRegistry::builder()
            .credentials(credentials)
            .sleeper(sleeper.clone())
            .base_url(id, server.uri())
            .build();
        Self {
            registry,
            sleeper,
            logs: Arc::new(LogStore::new()),
        }
    }

    pub fn params(&self, prompt: &str, model: &str, size: &str) -> GenerateImageParams {
        GenerateImageParams::new(prompt, model, size, self.logs.clone())
    }

    pub fn entries_of(&self, kind: LogKind) -> Vec<LogEntry> {
        self.logs
            .entries()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

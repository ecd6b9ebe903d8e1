//! In-memory object URLs for decoded image buffers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// URL scheme prefix of every object URL.
pub const BLOB_URL_PREFIX: &str = "blob:imagegate/";

/// A stored image buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/jpeg`.
    pub mime: String,
}

/// Process-local object URL registry.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: Mutex<HashMap<String, Blob>>,
}

impl BlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` and returns a fresh `blob:imagegate/<uuid>` URL.
    pub fn insert(&self, bytes: Vec<u8>, mime: impl Into<String>) -> String {
        let url = format!("{BLOB_URL_PREFIX}{}", uuid::Uuid::new_v4());
        self.lock().insert(
            url.clone(),
            Blob {
                bytes,
                mime: mime.into(),
            },
        );
        url
    }

    /// Returns the buffer behind `url`.
    pub fn get(&self, url: &str) -> Option<Blob> {
        self.lock().get(url).cloned()
    }

    /// Releases `url`, returning its buffer.
    pub fn revoke(&self, url: &str) -> Option<Blob> {
        self.lock().remove(url)
    }

    /// Number of live URLs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no URLs are live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns true if `url` is an object URL of this kind.
    pub fn is_blob_url(url: &str) -> bool {
        url.starts_with(BLOB_URL_PREFIX)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Blob>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

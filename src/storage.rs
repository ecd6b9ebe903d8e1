//! Key-value persistence and generation history.

use crate::error::{ImageGateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Key the history store persists under.
pub const HISTORY_STORAGE_KEY: &str = "image_generation_history";

/// Number of entries kept by [`HistoryStore`].
pub const MAX_HISTORY: usize = 50;

/// Plain string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// The file is read once on open and rewritten on every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                ImageGateError::Store(format!("{} is not a store file: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.lock();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.lock();
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

/// Record of one successful generation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Prompt that produced the batch.
    pub prompt: String,
    /// Primary (first) image.
    pub img_url: String,
    /// Concrete model id.
    pub model: String,
    /// Local time the batch finished.
    pub time: String,
    /// `WIDTHxHEIGHT`.
    pub size: String,
    /// Number of images in the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_count: Option<u32>,
    /// Every image in the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_images: Option<Vec<String>>,
}

/// Bounded newest-first history.
pub struct HistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
    backend: Option<Arc<dyn KeyValueStore>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// Creates an in-memory history.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            backend: None,
        }
    }

    /// Creates a history backed by `backend`, loading saved entries.
    pub fn with_backend(backend: Arc<dyn KeyValueStore>) -> Self {
        let mut loaded: Vec<HistoryEntry> = match backend.get(HISTORY_STORAGE_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable history: {e}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("failed to load history: {e}");
                Vec::new()
            }
        };
        loaded.truncate(MAX_HISTORY);
        Self {
            entries: Mutex::new(loaded),
            backend: Some(backend),
        }
    }

    /// Prepends `entry`, dropping the oldest beyond [`MAX_HISTORY`].
    pub fn add(&self, entry: HistoryEntry) {
        let mut entries = self.lock();
        entries.insert(0, entry);
        entries.truncate(MAX_HISTORY);
        self.persist(&entries);
    }

    /// Snapshot, newest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().clone()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.persist(&entries);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &[HistoryEntry]) {
        let Some(backend) = &self.backend else {
            return;
        };
        let result = serde_json::to_string(entries)
            .map_err(ImageGateError::from)
            .and_then(|json| backend.set(HISTORY_STORAGE_KEY, &json));
        if let Err(e) = result {
            tracing::warn!("failed to persist history: {e}");
        }
    }
}

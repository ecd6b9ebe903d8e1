//! Structured, redacting log sink shared by every provider.
//!
//! Providers push [`LogEntry`] values through the [`LogSink`] trait while a
//! generation runs. [`LogStore`] is the stock sink: it redacts each entry,
//! keeps the most recent [`MAX_LOGS`] in memory and mirrors them to an
//! optional [`KeyValueStore`] on [`LogSink::flush`].

use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Key the log store persists under.
pub const LOG_STORAGE_KEY: &str = "api_logs_history";

/// Number of entries kept by [`LogStore`].
pub const MAX_LOGS: usize = 100;

/// Replacement for sensitive values.
pub const REDACTED: &str = "[REDACTED]";

/// Strings longer than this many characters are truncated on persistence.
pub const MAX_LOGGED_STRING_CHARS: usize = 512;

const SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "api-key",
    "api_key",
    "apikey",
    "x-api-key",
    "token",
    "secret",
    "key",
    "password",
];

const SENSITIVE_FRAGMENTS: &[&str] = &[
    "secret",
    "password",
    "api_key",
    "api-key",
    "apikey",
    "access_key",
];

// Suffix-only so `input_tokens` and friends stay readable.
const SENSITIVE_SUFFIXES: &[&str] = &["_token", "-token"];

/// Kind of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Outbound HTTP request.
    Request,
    /// Parsed provider response.
    Response,
    /// Failure detected during generation.
    Error,
    /// Progress notes (poll results, retries).
    Info,
}

/// One structured log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall-clock `HH:MM:SS`.
    pub timestamp: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: LogKind,
    /// Arbitrary payload.
    pub data: Value,
}

impl LogEntry {
    /// Creates an entry stamped with the current local time.
    pub fn new(kind: LogKind, data: Value) -> Self {
        Self {
            timestamp: timestamp(),
            kind,
            data,
        }
    }

    /// Creates a `request` entry.
    pub fn request(data: Value) -> Self {
        Self::new(LogKind::Request, data)
    }

    /// Creates a `response` entry.
    pub fn response(data: Value) -> Self {
        Self::new(LogKind::Response, data)
    }

    /// Creates an `error` entry.
    pub fn error(data: Value) -> Self {
        Self::new(LogKind::Error, data)
    }

    /// Creates an `info` entry.
    pub fn info(data: Value) -> Self {
        Self::new(LogKind::Info, data)
    }
}

/// Destination for log entries.
///
/// Implementations must not block generation and must not fail; persistence
/// problems are reported through `tracing` only.
pub trait LogSink: Send + Sync {
    /// Records one entry.
    fn add_log(&self, entry: LogEntry);

    /// Writes buffered entries to durable storage, if the sink has any.
    fn flush(&self) {}
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn add_log(&self, _entry: LogEntry) {}
}

/// Current local time as `HH:MM:SS`.
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Masks a key as `first4...last4`; an empty key masks to an empty string.
pub fn mask_api_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = key.chars().collect();
    let head: String = chars.iter().take(4).collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{head}...{tail}")
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&lower.as_str())
        || SENSITIVE_FRAGMENTS.iter().any(|f| lower.contains(f))
        || SENSITIVE_SUFFIXES.iter().any(|f| lower.ends_with(f))
}

/// Returns a copy of `value` with sensitive fields redacted and long strings
/// truncated. Applying it twice gives the same result as applying it once.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let cleaned = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    sanitize(inner)
                };
                out.insert(key.clone(), cleaned);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::String(s) => {
            let len = s.chars().count();
            if len > MAX_LOGGED_STRING_CHARS {
                Value::String(format!("[TRUNCATED {len} chars]"))
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}

/// Bounded, redacting log store.
///
/// [`LogSink::add_log`] only touches memory. The backend is written on
/// [`LogSink::flush`], on [`LogStore::clear`] and when the store is dropped.
pub struct LogStore {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    backend: Option<Arc<dyn KeyValueStore>>,
    dirty: AtomicBool,
    flushing: Mutex<()>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore {
    /// Creates an in-memory store holding up to [`MAX_LOGS`] entries.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: MAX_LOGS,
            backend: None,
            dirty: AtomicBool::new(false),
            flushing: Mutex::new(()),
        }
    }

    /// Creates a store backed by `backend`, loading previously saved entries.
    pub fn with_backend(backend: Arc<dyn KeyValueStore>) -> Self {
        let loaded = load_entries(backend.as_ref());
        Self {
            entries: Mutex::new(loaded),
            capacity: MAX_LOGS,
            backend: Some(backend),
            dirty: AtomicBool::new(false),
            flushing: Mutex::new(()),
        }
    }

    /// Overrides the retention window.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        let mut entries = self.lock();
        while entries.len() > capacity.max(1) {
            entries.pop_front();
        }
        drop(entries);
        self
    }

    /// Returns a snapshot of the stored entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns true if entries were added since the last flush.
    pub fn has_unflushed(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Removes every entry and persists the empty list.
    pub fn clear(&self) {
        self.lock().clear();
        self.dirty.store(true, Ordering::Release);
        self.flush();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        // Serialized flushes, each snapshotting after the previous one
        // finished, so an older snapshot never lands over a newer one.
        let _flushing = self.flushing.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return;
        }
        let snapshot: Vec<LogEntry> = self.entries();
        let result = serde_json::to_string(&snapshot)
            .map_err(crate::ImageGateError::from)
            .and_then(|json| backend.set(LOG_STORAGE_KEY, &json));
        if let Err(e) = result {
            tracing::warn!("failed to persist logs: {e}");
        }
    }
}

impl LogSink for LogStore {
    fn add_log(&self, entry: LogEntry) {
        let entry = LogEntry {
            data: sanitize(&entry.data),
            ..entry
        };
        tracing::debug!(kind = ?entry.kind, data = %entry.data, "log entry");

        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        drop(entries);
        self.dirty.store(true, Ordering::Release);
    }

    fn flush(&self) {
        self.persist();
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.persist();
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn add_log(&self, entry: LogEntry) {
        (**self).add_log(entry);
    }

    fn flush(&self) {
        (**self).flush();
    }
}

fn load_entries(backend: &dyn KeyValueStore) -> VecDeque<LogEntry> {
    match backend.get(LOG_STORAGE_KEY) {
        Ok(Some(json)) => match serde_json::from_str::<Vec<LogEntry>>(&json) {
            Ok(entries) => {
                let skip = entries.len().saturating_sub(MAX_LOGS);
                entries.into_iter().skip(skip).collect()
            }
            Err(e) => {
                tracing::warn!("ignoring unreadable log history: {e}");
                VecDeque::new()
            }
        },
        Ok(None) => VecDeque::new(),
        Err(e) => {
            tracing::warn!("failed to load logs: {e}");
            VecDeque::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-abcdefgh"), "sk-a...efgh");
        assert_eq!(mask_api_key(""), "");
    }

    #[test]
    fn test_mask_short_key_does_not_panic() {
        assert_eq!(mask_api_key("abc"), "abc...abc");
    }

    #[test]
    fn test_sanitize_redacts_sensitive_keys() {
        let data = json!({
            "headers": {
                "Authorization": "Bearer sk-a...efgh",
                "API-KEY": "x",
                "Content-Type": "application/json"
            },
            "token": "t",
            "Secret": "s",
            "key": "k",
            "password": "p",
            "access_key_id": "AKLT",
            "refresh_token": "r",
            "prompt": "a cat"
        });
        let clean = sanitize(&data);

        assert_eq!(clean["headers"]["Authorization"], REDACTED);
        assert_eq!(clean["headers"]["API-KEY"], REDACTED);
        assert_eq!(clean["headers"]["Content-Type"], "application/json");
        assert_eq!(clean["token"], REDACTED);
        assert_eq!(clean["Secret"], REDACTED);
        assert_eq!(clean["key"], REDACTED);
        assert_eq!(clean["password"], REDACTED);
        assert_eq!(clean["access_key_id"], REDACTED);
        assert_eq!(clean["refresh_token"], REDACTED);
        assert_eq!(clean["prompt"], "a cat");
    }

    #[test]
    fn test_sanitize_keeps_non_sensitive_key_suffixes() {
        let clean = sanitize(&json!({
            "req_key": "high_aes_general_v20",
            "taskId": "t-1",
            "usage": {"input_tokens": 12, "output_tokens": 4160, "total_tokens": 4172},
            "session-token": "s"
        }));
        assert_eq!(clean["req_key"], "high_aes_general_v20");
        assert_eq!(clean["taskId"], "t-1");
        assert_eq!(clean["usage"]["input_tokens"], 12);
        assert_eq!(clean["usage"]["output_tokens"], 4160);
        assert_eq!(clean["usage"]["total_tokens"], 4172);
        assert_eq!(clean["session-token"], REDACTED);
    }

    #[test]
    fn test_sanitize_truncates_long_strings() {
        let blob = "A".repeat(2000);
        let clean = sanitize(&json!({"data": [{"b64_json": blob}]}));
        assert_eq!(clean["data"][0]["b64_json"], "[TRUNCATED 2000 chars]");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let data = json!({
            "Authorization": "Bearer abc",
            "nested": [{"secret_key": "x", "long": "B".repeat(600)}],
            "n": 1
        });
        let once = sanitize(&data);
        let twice = sanitize(&once);
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }

    #[test]
    fn test_entry_serializes_kind_as_type() {
        let entry = LogEntry::info(json!({"message": "hi"}));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "info");
        assert_eq!(entry.timestamp.len(), 8);
    }

    #[test]
    fn test_log_store_redacts_before_storing() {
        let store = LogStore::new();
        store.add_log(LogEntry::request(json!({"headers": {"authorization": "Bearer x"}})));
        let entries = store.entries();
        assert_eq!(entries[0].data["headers"]["authorization"], REDACTED);
    }

    #[test]
    fn test_log_store_is_bounded() {
        let store = LogStore::new();
        for i in 0..(MAX_LOGS + 20) {
            store.add_log(LogEntry::info(json!({"i": i})));
        }
        let entries = store.entries();
        assert_eq!(entries.len(), MAX_LOGS);
        assert_eq!(entries[0].data["i"], 20);
        assert_eq!(entries[MAX_LOGS - 1].data["i"], MAX_LOGS + 19);
    }

    #[test]
    fn test_log_store_persists_and_reloads() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let store = LogStore::with_backend(backend.clone());
        store.add_log(LogEntry::error(json!({"status": 500})));
        store.add_log(LogEntry::info(json!({"attempt": 1})));
        store.flush();

        let reloaded = LogStore::with_backend(backend);
        let entries = reloaded.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, LogKind::Error);
        assert_eq!(entries[1].data["attempt"], 1);
    }

    #[test]
    fn test_log_store_writes_backend_only_on_flush() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let store = LogStore::with_backend(backend.clone());
        store.add_log(LogEntry::request(json!({"url": "http://x"})));
        store.add_log(LogEntry::response(json!({"ok": true})));

        assert!(store.has_unflushed());
        assert_eq!(backend.get(LOG_STORAGE_KEY).unwrap(), None);

        store.flush();
        assert!(!store.has_unflushed());
        assert_eq!(LogStore::with_backend(backend.clone()).len(), 2);

        store.add_log(LogEntry::info(json!({"attempt": 1})));
        drop(store);
        assert_eq!(LogStore::with_backend(backend).len(), 3);
    }

    #[test]
    fn test_log_store_clear() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let store = LogStore::with_backend(backend.clone());
        store.add_log(LogEntry::info(json!({})));
        store.clear();
        assert!(store.is_empty());
        assert!(LogStore::with_backend(backend).is_empty());
    }
}

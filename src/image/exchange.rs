//! Logged HTTP exchange shared by the provider adapters.

use crate::error::{ImageGateError, Result};
use crate::logging::{mask_api_key, LogEntry, LogSink};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Fails with [`ImageGateError::InvalidModel`] on a blank model id.
pub(crate) fn require_model(model: &str) -> Result<()> {
    if model.trim().is_empty() {
        return Err(ImageGateError::InvalidModel(model.to_string()));
    }
    Ok(())
}

/// Headers for a Bearer-authenticated JSON request, with the key masked.
pub(crate) fn masked_bearer_headers(api_key: &str) -> Value {
    json!({
        "Content-Type": "application/json",
        "Authorization": format!("Bearer {}", mask_api_key(api_key)),
    })
}

/// Emits the `request` entry.
pub(crate) fn log_request(
    sink: &dyn LogSink,
    url: &str,
    method: &str,
    headers: Value,
    body: Value,
) {
    tracing::debug!(url, method, "sending provider request");
    sink.add_log(LogEntry::request(json!({
        "url": url,
        "method": method,
        "headers": headers,
        "body": body,
    })));
}

/// Reads a response, logging and failing on non-2xx statuses.
pub(crate) async fn read_json(sink: &dyn LogSink, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(api_failure(sink, status, body, None));
    }
    parse_body(response).await
}

/// Reads a 2xx body as JSON. A body that is not JSON is a
/// [`ImageGateError::Json`] failure, never a transport one.
pub(crate) async fn parse_body(response: reqwest::Response) -> Result<Value> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}

/// Logs an HTTP failure and returns the matching error.
pub(crate) fn api_failure(
    sink: &dyn LogSink,
    status: reqwest::StatusCode,
    body: String,
    extra: Option<(&str, Value)>,
) -> ImageGateError {
    let status_text = status.canonical_reason().unwrap_or_default().to_string();
    let mut data = json!({
        "status": status.as_u16(),
        "statusText": status_text,
        "error": body,
    });
    if let (Some((key, value)), Some(map)) = (extra, data.as_object_mut()) {
        map.insert(key.to_string(), value);
    }
    sink.add_log(LogEntry::error(data));
    tracing::debug!(status = status.as_u16(), "provider returned an error status");
    ImageGateError::ApiCallFailed {
        status: status.as_u16(),
        status_text,
        body,
    }
}

/// Emits the `response` entry.
pub(crate) fn log_response(sink: &dyn LogSink, body: &Value) {
    sink.add_log(LogEntry::response(body.clone()));
}

/// Decodes a response body into its typed shape, `None` on mismatch.
pub(crate) fn decode<T: DeserializeOwned>(body: &Value) -> Option<T> {
    serde_json::from_value(body.clone()).ok()
}

/// Logs failures not already recorded where they were detected.
pub(crate) fn log_unlogged(sink: &dyn LogSink, err: &ImageGateError) {
    if !err.is_logged() {
        sink.add_log(LogEntry::error(json!({
            "message": err.to_string(),
            "detail": format!("{err:?}"),
        })));
    }
}

/// Joins a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

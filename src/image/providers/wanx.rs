//! Alibaba Cloud Tongyi Wanx provider (asynchronous task + polling).
//!
//! Generation is a two-step protocol: a task is created with
//! `X-DashScope-Async: enable`, then `GET {base}/tasks/{task_id}` is polled
//! until the task reaches `SUCCEEDED` or `FAILED`, or the attempt budget
//! runs out.

use crate::credentials::CredentialResolver;
use crate::error::{ImageGateError, Result};
use crate::image::exchange;
use crate::image::provider::{ImageProvider, ProviderContext};
use crate::image::types::{GenerateImageParams, ImageSize, ProviderId};
use crate::logging::LogEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Public API base.
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

/// Delay before each status poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum number of status polls.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

const SUBMIT_PATH: &str = "/services/aigc/text2image/image-synthesis";

/// Wanx image generation provider.
pub struct WanxProvider {
    context: ProviderContext,
    base_url: String,
    poll_interval: Duration,
    max_attempts: u32,
}

impl WanxProvider {
    /// Creates a provider against the public endpoint.
    pub fn new(context: ProviderContext) -> Self {
        Self {
            context,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the delay between polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the poll budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    async fn submit_task(&self, params: &GenerateImageParams, api_key: &str) -> Result<String> {
        let url = exchange::join_url(&self.base_url, SUBMIT_PATH);
        let sink = params.sink.as_ref();

        let body = WanxRequest {
            model: &params.model,
            input: WanxInput {
                prompt: &params.prompt,
                negative_prompt: params.negative_prompt.as_deref().filter(|n| !n.is_empty()),
            },
            parameters: WanxParameters {
                size: &params.image_size,
                n: 1,
            },
        };

        let mut headers = exchange::masked_bearer_headers(api_key);
        headers["X-DashScope-Async"] = json!("enable");
        exchange::log_request(sink, &url, "POST", headers, serde_json::to_value(&body)?);

        let response = self
            .context
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("X-DashScope-Async", "enable")
            .json(&body)
            .send()
            .await?;
        let data = exchange::read_json(sink, response).await?;
        exchange::log_response(sink, &data);

        exchange::decode::<WanxTask>(&data)
            .and_then(|t| t.output)
            .and_then(|o| o.task_id)
            .filter(|id| !id.is_empty())
            .ok_or(ImageGateError::MissingTaskId)
    }

    async fn poll_task(
        &self,
        params: &GenerateImageParams,
        api_key: &str,
        task_id: &str,
    ) -> Result<String> {
        let url = exchange::join_url(&self.base_url, &format!("/tasks/{task_id}"));
        let sink = params.sink.as_ref();

        for attempt in 1..=self.max_attempts {
            self.context.sleeper.sleep(self.poll_interval).await;

            let response = self
                .context
                .client
                .get(&url)
                .bearer_auth(api_key)
                .send()
                .await?;
            let data = exchange::read_json(sink, response).await?;

            let output = exchange::decode::<WanxTask>(&data).and_then(|t| t.output);
            let status = output.as_ref().and_then(|o| o.task_status.clone());
            sink.add_log(LogEntry::info(json!({
                "taskId": task_id,
                "attempt": attempt,
                "status": status,
                "result": data,
            })));
            tracing::debug!(task_id, attempt, status = ?status, "polled task");

            match status.as_deref() {
                Some("SUCCEEDED") => {
                    return output
                        .and_then(|o| o.results.into_iter().next())
                        .and_then(|r| r.url)
                        .ok_or(ImageGateError::MissingImageUrl);
                }
                Some("FAILED") => {
                    let detail = data.get("output").cloned().unwrap_or(Value::Null);
                    return Err(ImageGateError::TaskFailed(detail.to_string()));
                }
                _ => {}
            }
        }

        Err(ImageGateError::TaskTimeout {
            task_id: task_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    async fn request_image(&self, params: &GenerateImageParams) -> Result<String> {
        exchange::require_model(&params.model)?;
        let api_key = self.api_key();
        let task_id = self.submit_task(params, &api_key).await?;
        self.poll_task(params, &api_key, &task_id).await
    }
}

#[async_trait]
impl ImageProvider for WanxProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Wanx
    }

    fn credentials(&self) -> &CredentialResolver {
        &self.context.credentials
    }

    async fn generate_image(&self, params: &GenerateImageParams) -> Result<String> {
        self.request_image(params)
            .await
            .inspect_err(|e| exchange::log_unlogged(params.sink.as_ref(), e))
    }

    fn model_sizes(&self, _model: &str) -> Vec<ImageSize> {
        vec![
            ImageSize::new(512, 512),
            ImageSize::new(768, 768),
            ImageSize::new(1024, 1024),
            ImageSize::new(720, 1280),
            ImageSize::new(1280, 720),
        ]
    }
}

#[derive(Debug, Serialize)]
struct WanxRequest<'a> {
    model: &'a str,
    input: WanxInput<'a>,
    parameters: WanxParameters<'a>,
}

#[derive(Debug, Serialize)]
struct WanxInput<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WanxParameters<'a> {
    size: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct WanxTask {
    #[serde(default)]
    output: Option<WanxOutput>,
}

#[derive(Debug, Deserialize)]
struct WanxOutput {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    task_status: Option<String>,
    #[serde(default)]
    results: Vec<WanxResult>,
}

#[derive(Debug, Deserialize)]
struct WanxResult {
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_request_serialization_with_negative_prompt() {
        let body = WanxRequest {
            model: "wanx2.1-t2i-turbo",
            input: WanxInput {
                prompt: "a koi pond",
                negative_prompt: Some("blurry"),
            },
            parameters: WanxParameters {
                size: "1024x1024",
                n: 1,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["input"]["negative_prompt"], "blurry");
        assert_eq!(json["parameters"]["n"], 1);
        assert_eq!(json["parameters"]["size"], "1024x1024");
    }

    #[test]
    fn test_request_serialization_skips_missing_negative_prompt() {
        let body = WanxRequest {
            model: "wanx2.1-t2i-turbo",
            input: WanxInput {
                prompt: "a koi pond",
                negative_prompt: None,
            },
            parameters: WanxParameters {
                size: "1024x1024",
                n: 1,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json["input"].get("negative_prompt").is_none());
    }

    #[test]
    fn test_task_deserialization() {
        let json = r#"{"output": {"task_id": "t-1", "task_status": "SUCCEEDED", "results": [{"url": "http://x/img.png"}]}, "request_id": "r"}"#;
        let task: WanxTask = serde_json::from_str(json).unwrap();
        let output = task.output.unwrap();
        assert_eq!(output.task_id.as_deref(), Some("t-1"));
        assert_eq!(output.results[0].url.as_deref(), Some("http://x/img.png"));
    }

    #[test]
    fn test_builder_options() {
        let provider = WanxProvider::new(ProviderContext::new(Arc::new(
            CredentialResolver::in_memory(),
        )))
        .with_poll_interval(Duration::from_millis(10))
        .with_max_attempts(0);
        assert_eq!(provider.poll_interval, Duration::from_millis(10));
        assert_eq!(provider.max_attempts, 1);
    }

    #[test]
    fn test_supported_sizes() {
        let provider = WanxProvider::new(ProviderContext::new(Arc::new(
            CredentialResolver::in_memory(),
        )));
        assert!(provider.is_image_size_supported("wanx2.1-t2i-plus", 720, 1280));
        assert!(!provider.is_image_size_supported("wanx2.1-t2i-plus", 1536, 1024));
        assert_eq!(
            provider.recommended_size("wanx2.1-t2i-plus", 16.0 / 9.0),
            ImageSize::new(1280, 720)
        );
    }
}

//! Volcengine Doubao text-to-image provider.
//!
//! Requests are signed with the HMAC-SHA256 canonical-request scheme from
//! [`crate::signing`]. The API key is the composite
//! `accessKeyId:secretAccessKey`. Success is signalled by the envelope
//! `code` (10000), not by the HTTP status.
//!
//! HTTP 401 and transport failures are retried up to [`MAX_RETRIES`] times,
//! waiting `1000ms * attempt` between tries. Every attempt is re-signed with
//! a fresh timestamp.

use crate::credentials::CredentialResolver;
use crate::error::{ImageGateError, Result};
use crate::image::exchange;
use crate::image::provider::{ImageProvider, ProviderContext};
use crate::image::types::{GenerateImageParams, ImageSize, ProviderId};
use crate::logging::{mask_api_key, LogEntry, LogSink};
use crate::signing::{canonical_query, CanonicalSigner, SignedHeaders, SigningRequest};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Public API base.
pub const DEFAULT_BASE_URL: &str = "https://visual.volcengineapi.com";

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;

/// Envelope code for a successful call.
pub const SUCCESS_CODE: i64 = 10000;

const SIGNER: CanonicalSigner = CanonicalSigner::new("cn-north-1", "cv");
const PATH: &str = "/";
const QUERY: &[(&str, &str)] = &[("Action", "CVProcess"), ("Version", "2022-08-31")];
const DEFAULT_DIMENSION: u32 = 512;
const RETRY_BACKOFF_MS: u64 = 1000;

/// Volcengine (Doubao) image generation provider.
pub struct VolcengineProvider {
    context: ProviderContext,
    base_url: String,
}

impl VolcengineProvider {
    /// Creates a provider against the public endpoint.
    pub fn new(context: ProviderContext) -> Self {
        Self {
            context,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Overrides the API base URL. The signed `host` follows the override.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Host (with port, when explicit) that requests are signed for.
    fn signing_host(&self) -> Result<String> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ImageGateError::InvalidRequest(format!("bad base URL: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ImageGateError::InvalidRequest("base URL has no host".into()))?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    async fn backoff(&self, sink: &dyn LogSink, attempt: u32, data: Value) {
        sink.add_log(LogEntry::info(data));
        let delay = Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt));
        tracing::warn!(attempt, ?delay, "retrying volcengine request");
        self.context.sleeper.sleep(delay).await;
    }

    async fn request_image(&self, params: &GenerateImageParams) -> Result<String> {
        exchange::require_model(&params.model)?;
        let api_key = self.api_key();
        let (access_key_id, secret_access_key) = split_credential(&api_key)?;
        let sink = params.sink.as_ref();

        let host = self.signing_host()?;
        let url = format!(
            "{}?{}",
            exchange::join_url(&self.base_url, PATH),
            canonical_query(QUERY)
        );

        let (width, height) = parse_dimensions(&params.image_size);
        let body = VolcengineRequest::new(
            &params.model,
            &params.prompt,
            width,
            height,
            params.negative_prompt.as_deref(),
        );
        let body_json = serde_json::to_value(&body)?;
        let body_string = serde_json::to_string(&body)?;

        let mut attempt = 0;
        loop {
            let signed = SIGNER.sign(
                &SigningRequest {
                    access_key_id,
                    secret_access_key,
                    method: "POST",
                    host: &host,
                    path: PATH,
                    query: QUERY,
                    body: &body_string,
                },
                Utc::now(),
            );
            let logged_headers = masked_headers(&signed, access_key_id);

            let mut request_log = json!({
                "url": url,
                "method": "POST",
                "headers": logged_headers,
                "body": body_json,
            });
            if attempt > 0 {
                request_log["retryAttempt"] = json!(attempt);
            }
            tracing::debug!(url, attempt, "sending signed volcengine request");
            sink.add_log(LogEntry::request(request_log));

            let sent = self
                .context
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Authorization", &signed.authorization)
                .header("X-Date", &signed.x_date)
                .header("X-Content-Sha256", &signed.x_content_sha256)
                .body(body_string.clone())
                .send()
                .await;

            let response = match sent.map_err(ImageGateError::from) {
                Ok(response) => response,
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let message =
                        format!("network request failed, retry {attempt} of {MAX_RETRIES}");
                    let data = json!({
                        "message": message,
                        "originalError": err.to_string(),
                    });
                    self.backoff(sink, attempt, data).await;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let details = json!({ "headers": logged_headers, "url": url });
                let err =
                    exchange::api_failure(sink, status, text, Some(("requestDetails", details)));
                if err.is_retryable() && attempt < MAX_RETRIES {
                    attempt += 1;
                    let message =
                        format!("authentication failed, retry {attempt} of {MAX_RETRIES}");
                    let data = json!({ "message": message });
                    self.backoff(sink, attempt, data).await;
                    continue;
                }
                return Err(err);
            }

            let data = exchange::parse_body(response).await?;
            exchange::log_response(sink, &data);
            return self.extract_image(sink, &data);
        }
    }

    fn extract_image(&self, sink: &dyn LogSink, data: &Value) -> Result<String> {
        let code = data.get("code").and_then(Value::as_i64).unwrap_or_default();
        if code != SUCCESS_CODE {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("unknown error")
                .to_string();
            sink.add_log(LogEntry::error(json!({ "code": code, "message": message })));
            return Err(ImageGateError::ProviderError { code, message });
        }

        let payload = exchange::decode::<VolcengineResponse>(data)
            .and_then(|r| r.data)
            .ok_or(ImageGateError::MissingImageUrl)?;

        if let Some(url) = payload.image_urls.into_iter().flatten().next() {
            return Ok(url);
        }
        let encoded = payload
            .binary_data_base64
            .into_iter()
            .flatten()
            .next()
            .ok_or(ImageGateError::MissingImageUrl)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ImageGateError::Decode(e.to_string()))?;
        Ok(self.context.blobs.insert(bytes, "image/jpeg"))
    }
}

#[async_trait]
impl ImageProvider for VolcengineProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Doubao
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
            ImageSize::new(512, 768),
            ImageSize::new(768, 512),
        ]
    }
}

/// Splits `accessKeyId:secretAccessKey` into exactly two non-empty parts.
fn split_credential(api_key: &str) -> Result<(&str, &str)> {
    let mut parts = api_key.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(secret), None) if !id.is_empty() && !secret.is_empty() => Ok((id, secret)),
        _ => Err(ImageGateError::InvalidCredentialFormat),
    }
}

/// `WIDTHxHEIGHT` with each unparseable or zero side defaulting to 512.
fn parse_dimensions(size: &str) -> (u32, u32) {
    let mut sides = size.split(['x', 'X']).map(|s| {
        s.trim()
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_DIMENSION)
    });
    let width = sides.next().unwrap_or(DEFAULT_DIMENSION);
    let height = sides.next().unwrap_or(DEFAULT_DIMENSION);
    (width, height)
}

fn masked_headers(signed: &SignedHeaders, access_key_id: &str) -> Value {
    json!({
        "Content-Type": "application/json",
        "X-Date": signed.x_date,
        "Authorization": signed
            .authorization
            .replacen(access_key_id, &mask_api_key(access_key_id), 1),
        "X-Content-Sha256": signed.x_content_sha256,
    })
}

/// Model generation profile selected by the model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    V21,
    V20Pro,
    V20,
}

impl Profile {
    fn from_model(model: &str) -> Self {
        match model {
            "doubaoimg-text2img-v2.1" => Self::V21,
            "doubaoimg-text2img-v2.0pro" => Self::V20Pro,
            _ => Self::V20,
        }
    }

    fn req_key(self) -> &'static str {
        match self {
            Self::V21 => "high_aes_general_v21_L",
            Self::V20Pro => "high_aes_general_v20_L",
            Self::V20 => "high_aes_general_v20",
        }
    }

    fn schedule_conf(self) -> Option<&'static str> {
        match self {
            Self::V21 | Self::V20Pro => Some("general_v20_9B_pe"),
            Self::V20 => None,
        }
    }

    fn ddim_steps(self) -> u32 {
        match self {
            Self::V21 => 25,
            Self::V20Pro | Self::V20 => 16,
        }
    }
}

#[derive(Debug, Serialize)]
struct VolcengineRequest<'a> {
    width: u32,
    height: u32,
    prompt: &'a str,
    return_url: bool,
    use_sr: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    req_key: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    req_schedule_conf: Option<&'static str>,
    seed: i64,
    scale: f64,
    ddim_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_pre_llm: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_rephraser: Option<bool>,
    logo_info: LogoInfo,
}

impl<'a> VolcengineRequest<'a> {
    fn new(
        model: &str,
        prompt: &'a str,
        width: u32,
        height: u32,
        negative_prompt: Option<&'a str>,
    ) -> Self {
        let profile = Profile::from_model(model);
        let pre_llm = profile != Profile::V20;
        Self {
            width,
            height,
            prompt,
            return_url: true,
            use_sr: true,
            negative_prompt: negative_prompt.filter(|n| !n.is_empty()),
            req_key: profile.req_key(),
            req_schedule_conf: profile.schedule_conf(),
            seed: -1,
            scale: 3.5,
            ddim_steps: profile.ddim_steps(),
            use_pre_llm: pre_llm.then_some(true),
            use_rephraser: (!pre_llm).then_some(true),
            logo_info: LogoInfo::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LogoInfo {
    add_logo: bool,
    position: u32,
    language: u32,
    opacity: f64,
}

impl Default for LogoInfo {
    fn default() -> Self {
        Self {
            add_logo: false,
            position: 0,
            language: 0,
            opacity: 0.3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VolcengineResponse {
    #[serde(default)]
    data: Option<VolcengineData>,
}

#[derive(Debug, Deserialize)]
struct VolcengineData {
    #[serde(default)]
    image_urls: Option<Vec<String>>,
    #[serde(default)]
    binary_data_base64: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogKind, LogStore};
    use std::sync::Arc;

    fn provider() -> VolcengineProvider {
        VolcengineProvider::new(ProviderContext::new(Arc::new(
            CredentialResolver::in_memory(),
        )))
    }

    #[test]
    fn test_split_credential() {
        assert_eq!(split_credential("AK:SK").unwrap(), ("AK", "SK"));
        for bad in ["", "AK", "AK:", ":SK", "a:b:c"] {
            assert!(
                matches!(split_credential(bad), Err(ImageGateError::InvalidCredentialFormat)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("768x512"), (768, 512));
        assert_eq!(parse_dimensions("abcx768"), (512, 768));
        assert_eq!(parse_dimensions(""), (512, 512));
        assert_eq!(parse_dimensions("0x0"), (512, 512));
    }

    #[test]
    fn test_request_profile_v21() {
        let body = VolcengineRequest::new("doubaoimg-text2img-v2.1", "p", 512, 512, None);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["req_key"], "high_aes_general_v21_L");
        assert_eq!(json["req_schedule_conf"], "general_v20_9B_pe");
        assert_eq!(json["ddim_steps"], 25);
        assert_eq!(json["use_pre_llm"], true);
        assert!(json.get("use_rephraser").is_none());
        assert!(json.get("negative_prompt").is_none());
        assert_eq!(json["seed"], -1);
        assert_eq!(json["scale"], 3.5);
        assert_eq!(json["logo_info"]["opacity"], 0.3);
    }

    #[test]
    fn test_request_profile_v20pro() {
        let body =
            VolcengineRequest::new("doubaoimg-text2img-v2.0pro", "p", 512, 768, Some("noise"));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["req_key"], "high_aes_general_v20_L");
        assert_eq!(json["ddim_steps"], 16);
        assert_eq!(json["use_pre_llm"], true);
        assert_eq!(json["negative_prompt"], "noise");
        assert_eq!(json["height"], 768);
    }

    #[test]
    fn test_request_profile_default() {
        let body = VolcengineRequest::new("doubaoimg-text2img-v2.0", "p", 512, 512, Some(""));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["req_key"], "high_aes_general_v20");
        assert!(json.get("req_schedule_conf").is_none());
        assert_eq!(json["use_rephraser"], true);
        assert!(json.get("use_pre_llm").is_none());
        assert!(json.get("negative_prompt").is_none());
    }

    #[test]
    fn test_signing_host_includes_explicit_port() {
        assert_eq!(provider().signing_host().unwrap(), "visual.volcengineapi.com");
        let local = provider().with_base_url("http://127.0.0.1:8080");
        assert_eq!(local.signing_host().unwrap(), "127.0.0.1:8080");
        let bad = provider().with_base_url("not a url");
        assert!(matches!(bad.signing_host(), Err(ImageGateError::InvalidRequest(_))));
    }

    #[test]
    fn test_masked_headers_hide_access_key() {
        let signed = SignedHeaders {
            authorization: "HMAC-SHA256 Credential=AKLTexampleKey/20250314/cn-north-1/cv/request".into(),
            x_date: "20250314T081500Z".into(),
            x_content_sha256: "abc".into(),
        };
        let headers = masked_headers(&signed, "AKLTexampleKey");
        let auth = headers["Authorization"].as_str().unwrap();
        assert!(auth.contains("Credential=AKLT...eKey/"));
        assert!(!auth.contains("AKLTexampleKey"));
    }

    #[test]
    fn test_extract_image_url() {
        let p = provider();
        let sink = LogStore::new();
        let data = json!({"code": 10000, "data": {"image_urls": ["https://x/a.jpg"]}});
        assert_eq!(p.extract_image(&sink, &data).unwrap(), "https://x/a.jpg");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_extract_image_base64_creates_blob() {
        let p = provider();
        let sink = LogStore::new();
        let data = json!({
            "code": 10000,
            "data": {"image_urls": null, "binary_data_base64": ["AQID"]}
        });
        let url = p.extract_image(&sink, &data).unwrap();
        let blob = p.context.blobs.get(&url).unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert_eq!(blob.mime, "image/jpeg");
    }

    #[test]
    fn test_extract_image_bad_base64() {
        let p = provider();
        let data = json!({"code": 10000, "data": {"binary_data_base64": ["!!!"]}});
        assert!(matches!(
            p.extract_image(&LogStore::new(), &data),
            Err(ImageGateError::Decode(_))
        ));
    }

    #[test]
    fn test_extract_image_provider_error_is_logged() {
        let p = provider();
        let sink = LogStore::new();
        let data = json!({"code": 50411, "message": "Pre Img Risk Not Pass"});
        let err = p.extract_image(&sink, &data).unwrap_err();
        assert!(matches!(err, ImageGateError::ProviderError { code: 50411, .. }));
        assert!(err.is_logged());
        let entries = sink.entries();
        assert_eq!(entries[0].kind, LogKind::Error);
        assert_eq!(entries[0].data["code"], 50411);
    }

    #[test]
    fn test_extract_image_missing_payload() {
        let p = provider();
        let data = json!({"code": 10000, "data": {}});
        assert!(matches!(
            p.extract_image(&LogStore::new(), &data),
            Err(ImageGateError::MissingImageUrl)
        ));
    }
}

//! Error types for image generation.

/// Errors that can occur while generating images.
#[derive(Debug, thiserror::Error)]
pub enum ImageGateError {
    /// Model id was empty or otherwise unusable.
    #[error("invalid model: {0:?}")]
    InvalidModel(String),

    /// Composite credential did not split into `accessKeyId:secretAccessKey`.
    #[error("invalid credential format, expected AccessKeyId:SecretAccessKey")]
    InvalidCredentialFormat,

    /// No API key configured for the provider.
    #[error("missing API key for {provider} ({key_name})")]
    MissingApiKey {
        /// Display name of the provider.
        provider: String,
        /// Key-value name the key is stored under.
        key_name: String,
    },

    /// Task-creation response carried no task id.
    #[error("no task id in task creation response")]
    MissingTaskId,

    /// Successful response carried no image URL or inline image data.
    #[error("no image URL in provider response")]
    MissingImageUrl,

    /// Provider answered with a non-2xx HTTP status.
    #[error("API call failed: {status} {status_text} - {body}")]
    ApiCallFailed {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status.
        status_text: String,
        /// Raw error body.
        body: String,
    },

    /// Provider answered 2xx but its envelope reported an error code.
    #[error("provider error: {code} - {message}")]
    ProviderError {
        /// Vendor-specific code.
        code: i64,
        /// Vendor-specific message.
        message: String,
    },

    /// Asynchronous task reached the FAILED state.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Task did not reach a terminal state within the attempt budget.
    #[error("task {task_id} not finished after {attempts} polls")]
    TaskTimeout {
        /// Task handle returned by the provider.
        task_id: String,
        /// Number of polls performed.
        attempts: u32,
    },

    /// No provider handles this model id.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// Prompt exceeds the model's limit.
    #[error("prompt too long: {length} chars, max {max}")]
    PromptTooLong {
        /// Prompt length in characters.
        length: usize,
        /// Effective limit.
        max: usize,
    },

    /// Negative prompt exceeds the model's limit.
    #[error("negative prompt too long: {length} chars, max {max}")]
    NegativePromptTooLong {
        /// Negative prompt length in characters.
        length: usize,
        /// Effective limit.
        max: usize,
    },

    /// Size not accepted by the model.
    #[error("unsupported image size {width}x{height} for {model}")]
    UnsupportedImageSize {
        /// Model id.
        model: String,
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Empty prompt or otherwise malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Size string is not `WIDTHxHEIGHT`.
    #[error("invalid image size: {0:?}")]
    InvalidImageSize(String),

    /// Batch size outside the accepted range.
    #[error("image count must be between 1 and {max}, got {count}")]
    InvalidImageCount {
        /// Requested count.
        count: u32,
        /// Upper bound.
        max: u32,
    },

    /// Network or HTTP transport error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (e.g., file-backed store).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key-value store failure.
    #[error("store error: {0}")]
    Store(String),

    /// A spawned generation task panicked or was aborted.
    #[error("generation task aborted: {0}")]
    TaskJoin(String),
}

impl ImageGateError {
    /// Returns true for the transient classes worth retrying
    /// (HTTP 401 and transport failures).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::ApiCallFailed { status: 401, .. }
        )
    }

    /// Returns true if this failure was written to the log sink where it
    /// was detected.
    pub fn is_logged(&self) -> bool {
        matches!(self, Self::ApiCallFailed { .. } | Self::ProviderError { .. })
    }

    /// Returns true if polling gave up; the task may still finish remotely.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TaskTimeout { .. })
    }
}

/// Result type alias for image generation operations.
pub type Result<T> = std::result::Result<T, ImageGateError>;

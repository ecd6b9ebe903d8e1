//! Batch generation: validation, concurrent dispatch and history.

use crate::error::{ImageGateError, Result};
use crate::image::provider::{ImageProvider, SizePolicy};
use crate::image::registry::ProviderRegistry;
use crate::image::types::{GenerateImageParams, ImageSize};
use crate::logging::LogSink;
use crate::storage::{HistoryEntry, HistoryStore};
use futures::future::try_join_all;
use futures::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Largest batch accepted by [`Generator::generate`].
pub const MAX_IMAGE_COUNT: u32 = 6;

/// Smallest side accepted by the generic size rule.
pub const MIN_DIMENSION: u32 = 512;

/// Largest side accepted by the generic size rule.
pub const MAX_DIMENSION: u32 = 2048;

/// Both sides must be a multiple of this.
pub const DIMENSION_STEP: u32 = 16;

/// Pixel budget of the generic size rule (2^21).
pub const MAX_PIXELS: u64 = 1 << 21;

/// Generic size rule for providers without an enumerated size list.
pub fn is_generic_size_valid(size: ImageSize) -> bool {
    let side_ok =
        |v: u32| (MIN_DIMENSION..=MAX_DIMENSION).contains(&v) && v % DIMENSION_STEP == 0;
    side_ok(size.width) && side_ok(size.height) && size.pixels() <= MAX_PIXELS
}

/// One batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInput {
    /// Text prompt.
    pub prompt: String,
    /// Concrete model id.
    pub model: String,
    /// API key to store before generating, if the caller supplies one.
    pub api_key: Option<String>,
    /// `WIDTHxHEIGHT`.
    pub size: String,
    /// Number of images.
    pub count: u32,
    /// Negative prompt; dropped for models that do not accept one.
    pub negative_prompt: Option<String>,
}

impl GenerationInput {
    /// One 1024x1024 image.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            api_key: None,
            size: ImageSize::SQUARE_1024.to_string(),
            count: 1,
            negative_prompt: None,
        }
    }

    /// Sets the size string.
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    /// Sets the batch size.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Supplies an API key to write through before generating.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the negative prompt.
    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }
}

/// Result of a successful batch.
#[derive(Debug, Clone)]
pub struct GenerationBatch {
    /// Every image, in call order.
    pub images: Vec<String>,
    /// History record for the batch.
    pub entry: HistoryEntry,
    /// Wall time of the batch.
    pub elapsed: Duration,
}

/// Validates requests and runs generation batches.
pub struct Generator {
    registry: Arc<ProviderRegistry>,
    sink: Arc<dyn LogSink>,
    history: Option<Arc<HistoryStore>>,
}

impl Generator {
    /// Creates a generator logging to `sink`, without history.
    pub fn new(registry: Arc<ProviderRegistry>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            registry,
            sink,
            history: None,
        }
    }

    /// Records successful batches in `history`.
    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Provider registry.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Attached history, if any.
    pub fn history(&self) -> Option<&Arc<HistoryStore>> {
        self.history.as_ref()
    }

    /// Generates `input.count` images concurrently.
    ///
    /// The first failing call fails the batch; the remaining calls keep
    /// running detached and their results are discarded. No history entry
    /// is written unless every call succeeds.
    pub async fn generate(&self, input: &GenerationInput) -> Result<GenerationBatch> {
        let started = Instant::now();
        let (provider, params) = self.prepare(input)?;

        tracing::debug!(
            model = %input.model,
            provider = provider.name(),
            count = input.count,
            "starting generation batch"
        );

        let calls = (0..input.count).map(|_| {
            let provider = Arc::clone(&provider);
            let params = params.clone();
            tokio::spawn(async move { provider.generate_image(&params).await }).map(|joined| {
                joined
                    .map_err(|e| ImageGateError::TaskJoin(e.to_string()))
                    .and_then(|result| result)
            })
        });
        let joined = try_join_all(calls).await;
        self.sink.flush();
        let images = joined?;

        let entry = HistoryEntry {
            prompt: input.prompt.clone(),
            img_url: images.first().cloned().unwrap_or_default(),
            model: input.model.clone(),
            time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            size: input.size.clone(),
            image_count: Some(input.count),
            all_images: Some(images.clone()),
        };
        if let Some(history) = &self.history {
            history.add(entry.clone());
        }

        Ok(GenerationBatch {
            images,
            entry,
            elapsed: started.elapsed(),
        })
    }

    fn prepare(
        &self,
        input: &GenerationInput,
    ) -> Result<(Arc<dyn ImageProvider>, GenerateImageParams)> {
        if input.prompt.trim().is_empty() {
            return Err(ImageGateError::InvalidRequest("prompt is empty".into()));
        }

        let provider = self.registry.resolve(&input.model)?;
        let config = provider.config();

        let max = config.prompt_max_length(&input.model);
        let length = input.prompt.chars().count();
        if length > max {
            return Err(ImageGateError::PromptTooLong { length, max });
        }

        let negative_prompt = match input.negative_prompt.as_deref() {
            Some(negative)
                if !negative.is_empty() && config.supports_negative_prompt(&input.model) =>
            {
                let max = config.negative_prompt_max_length(&input.model);
                let length = negative.chars().count();
                if length > max {
                    return Err(ImageGateError::NegativePromptTooLong { length, max });
                }
                Some(negative.to_string())
            }
            _ => None,
        };

        if !(1..=MAX_IMAGE_COUNT).contains(&input.count) {
            return Err(ImageGateError::InvalidImageCount {
                count: input.count,
                max: MAX_IMAGE_COUNT,
            });
        }

        let size = ImageSize::parse(&input.size)?;
        let size_ok = match provider.size_policy() {
            SizePolicy::Enumerated => {
                provider.is_image_size_supported(&input.model, size.width, size.height)
            }
            SizePolicy::Flexible => is_generic_size_valid(size),
        };
        if !size_ok {
            return Err(ImageGateError::UnsupportedImageSize {
                model: input.model.clone(),
                width: size.width,
                height: size.height,
            });
        }

        if let Some(key) = input.api_key.as_deref().filter(|k| !k.is_empty()) {
            provider.set_api_key(key)?;
        }
        if provider.api_key().is_empty() {
            return Err(ImageGateError::MissingApiKey {
                provider: provider.name().to_string(),
                key_name: config.api_key_name.to_string(),
            });
        }

        let mut params = GenerateImageParams::new(
            input.prompt.clone(),
            input.model.clone(),
            input.size.clone(),
            Arc::clone(&self.sink),
        );
        params.negative_prompt = negative_prompt;
        Ok((provider, params))
    }

    /// Sizes for `model`, `[1024x1024]` if no provider serves it.
    pub fn supported_sizes(&self, model: &str) -> Vec<ImageSize> {
        match self.registry.resolve(model) {
            Ok(provider) => provider.supported_sizes(model),
            Err(_) => vec![ImageSize::SQUARE_1024],
        }
    }

    /// Size check for `model`; permissive if no provider serves it.
    pub fn is_image_size_supported(&self, model: &str, width: u32, height: u32) -> bool {
        match self.registry.resolve(model) {
            Ok(provider) => provider.is_image_size_supported(model, width, height),
            Err(_) => true,
        }
    }

    /// Recommended size for `model`, 1024x1024 if no provider serves it.
    pub fn recommended_size(&self, model: &str, aspect_ratio: f64) -> ImageSize {
        match self.registry.resolve(model) {
            Ok(provider) => provider.recommended_size(model, aspect_ratio),
            Err(_) => ImageSize::SQUARE_1024,
        }
    }
}

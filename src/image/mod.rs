//! Image generation module.

pub mod blob;
pub(crate) mod exchange;
pub mod orchestrator;
mod provider;
pub mod providers;
pub mod registry;
pub mod sleep;
mod types;

pub use blob::{Blob, BlobStore};
pub use orchestrator::{GenerationBatch, GenerationInput, Generator};
pub use provider::{recommend_size, ImageProvider, ProviderContext, SizePolicy};
pub use registry::{resolve_provider_id, ProviderRegistry, ProviderRegistryBuilder};
pub use sleep::{RecordingSleeper, Sleeper, TokioSleeper};
pub use types::{AspectRatio, GenerateImageParams, ImageSize, ProviderId};

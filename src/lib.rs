#![warn(missing_docs)]
//! ImageGate - one interface over many text-to-image providers.
//!
//! Every vendor (CogView, OpenAI, Wanx, Qianfan, Volcengine Doubao,
//! MiniMax) sits behind the [`ImageProvider`] trait. A [`ProviderRegistry`]
//! maps concrete model ids to memoized provider instances and a
//! [`Generator`] validates requests, runs batches concurrently and records
//! history.
//!
//! # Quick Start
//!
//! ```no_run
//! use imagegate::{GenerationInput, Generator, LogStore, ProviderRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> imagegate::Result<()> {
//!     let registry = Arc::new(ProviderRegistry::new());
//!     let generator = Generator::new(registry, Arc::new(LogStore::new()));
//!     let input = GenerationInput::new("A lighthouse at dusk", "cogview-3-flash")
//!         .with_size("1024x1024")
//!         .with_count(2);
//!     let batch = generator.generate(&input).await?;
//!     for url in &batch.images {
//!         println!("{url}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Credentials
//!
//! Keys resolve through [`CredentialResolver`]: environment variables
//! (`ZHIPU_API_KEY`, `OPENAI_API_KEY`, `DASHSCOPE_API_KEY`,
//! `QIANFAN_API_KEY`, `VOLCENGINE_API_KEY`, `MINIMAX_API_KEY`) are checked
//! first and cannot be overwritten; everything else comes from a
//! [`KeyValueStore`]. Volcengine expects `AccessKeyId:SecretAccessKey`.
//!
//! # Features
//!
//! - `cli`: the `imagegate` command-line interface (default)

pub mod config;
pub mod credentials;
mod error;
pub mod image;
pub mod logging;
pub mod signing;
pub mod storage;

// Re-export error types at crate root
pub use error::{ImageGateError, Result};

pub use credentials::{ConfigSource, CredentialResolver, EnvConfig, StaticConfig};
pub use logging::{LogEntry, LogKind, LogSink, LogStore, NullSink};
pub use storage::{FileStore, HistoryEntry, HistoryStore, KeyValueStore, MemoryStore};

pub use image::{
    AspectRatio, GenerateImageParams, GenerationBatch, GenerationInput, Generator, ImageProvider,
    ImageSize, ProviderId, ProviderRegistry, SizePolicy,
};

pub use image::providers::{
    CogviewProvider, MinimaxProvider, OpenAiImageProvider, QianfanProvider, VolcengineProvider,
    WanxProvider,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{ImageGateError, Result};
    pub use crate::image::{
        GenerateImageParams, GenerationBatch, GenerationInput, Generator, ImageProvider,
        ImageSize, ProviderId, ProviderRegistry,
    };
    pub use crate::logging::{LogSink, LogStore};
    pub use crate::storage::HistoryStore;
}

//! Picks whichever provider has a key configured and generates with it.
//!
//! Run with: `cargo run --example multi_provider`
//!
//! Requires at least one of: `ZHIPU_API_KEY`, `OPENAI_API_KEY`,
//! `DASHSCOPE_API_KEY`, `QIANFAN_API_KEY`, `VOLCENGINE_API_KEY`, or
//! `MINIMAX_API_KEY`.

use imagegate::{GenerationInput, Generator, LogStore, ProviderId, ProviderRegistry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> imagegate::Result<()> {
    let registry = Arc::new(ProviderRegistry::new());

    let Some(provider) = ProviderId::ALL
        .into_iter()
        .map(|id| registry.provider(id))
        .find(|p| !p.api_key().is_empty())
    else {
        eprintln!("Set at least one API key environment variable.");
        std::process::exit(1);
    };

    let config = provider.config();
    let Some(model) = config.children.first().map(|sub| sub.value) else {
        eprintln!("{} has no models", config.name);
        std::process::exit(1);
    };
    let size = provider.recommended_size(model, 16.0 / 9.0);
    println!("Provider: {} ({model}, {size})", provider.name());

    let generator = Generator::new(registry, Arc::new(LogStore::new()));
    let input = GenerationInput::new("A serene mountain lake at dawn", model)
        .with_size(size.to_string());
    let batch = generator.generate(&input).await?;

    println!("Generated {} at {}", batch.entry.img_url, batch.entry.time);

    Ok(())
}

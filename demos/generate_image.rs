//! Basic image generation example.
//!
//! Run with: `cargo run --example generate_image`
//!
//! Requires `ZHIPU_API_KEY` environment variable.

use imagegate::{GenerationInput, Generator, LogStore, ProviderRegistry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> imagegate::Result<()> {
    let logs = Arc::new(LogStore::new());
    let generator = Generator::new(Arc::new(ProviderRegistry::new()), logs.clone());

    let prompt = "A golden retriever puppy playing in snow";
    let input = GenerationInput::new(prompt, "cogview-3-flash").with_size("1024x1024");
    let batch = generator.generate(&input).await?;

    for url in &batch.images {
        println!("Generated image: {url}");
    }
    println!(
        "{} image(s) in {:.1}s, {} log entries",
        batch.images.len(),
        batch.elapsed.as_secs_f64(),
        logs.len()
    );

    Ok(())
}

//! CLI for ImageGate - text-to-image generation across providers.

use anyhow::Context;
use base64::Engine;
use clap::{Args, Parser, Subcommand};
use imagegate::config::MODELS;
use imagegate::image::{AspectRatio, BlobStore, ImageSize, SizePolicy};
use imagegate::{
    CredentialResolver, FileStore, GenerationInput, Generator, HistoryStore, KeyValueStore,
    LogStore, ProviderRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imagegate")]
#[command(about = "Generate images via CogView, OpenAI, Wanx, Qianfan, Doubao and MiniMax")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// JSON file holding keys, history and logs
    #[arg(long, global = true, env = "IMAGEGATE_STORE", default_value = "imagegate-store.json")]
    store: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate images from a text prompt
    Generate(GenerateArgs),

    /// List providers and models
    Models,

    /// List sizes supported by a model
    Sizes {
        /// Model id
        #[arg(short, long)]
        model: String,
    },

    /// Store an API key (ignored when pinned by the environment)
    SetKey {
        /// Key name, e.g. zhipuai_key
        key_name: String,
        /// Key value
        value: String,
    },

    /// Show generation history
    History {
        /// Remove every entry
        #[arg(long)]
        clear: bool,
    },

    /// Show the API log
    Logs {
        /// Remove every entry
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the image
    prompt: String,

    /// Model id, e.g. cogview-3-flash
    #[arg(short, long)]
    model: String,

    /// Image size as WIDTHxHEIGHT
    #[arg(long, conflicts_with = "aspect")]
    size: Option<ImageSize>,

    /// Aspect ratio (21:9, 16:9, 4:3, 3:2, 1:1, 9:16)
    #[arg(long)]
    aspect: Option<AspectRatio>,

    /// Number of images (1-6)
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,

    /// Negative prompt, for models that accept one
    #[arg(long)]
    negative: Option<String>,

    /// API key to store before generating
    #[arg(long)]
    api_key: Option<String>,

    /// Directory for images returned inline (data: and blob: URLs)
    #[arg(long)]
    save_dir: Option<PathBuf>,
}

struct App {
    store: Arc<dyn KeyValueStore>,
    registry: Arc<ProviderRegistry>,
}

impl App {
    fn open(path: &Path) -> anyhow::Result<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(
            FileStore::open(path).with_context(|| format!("opening store {}", path.display()))?,
        );
        let registry = ProviderRegistry::builder()
            .credentials(Arc::new(CredentialResolver::new(store.clone())))
            .build();
        Ok(Self {
            store,
            registry: Arc::new(registry),
        })
    }

    fn logs(&self) -> LogStore {
        LogStore::with_backend(self.store.clone())
    }

    fn history(&self) -> HistoryStore {
        HistoryStore::with_backend(self.store.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App::open(&cli.store)?;

    match cli.command {
        Commands::Generate(args) => generate(&app, args, cli.json).await?,
        Commands::Models => list_models(cli.json)?,
        Commands::Sizes { model } => list_sizes(&app, &model, cli.json)?,
        Commands::SetKey { key_name, value } => set_key(&app, &key_name, &value)?,
        Commands::History { clear } => show_history(&app, clear, cli.json)?,
        Commands::Logs { clear } => show_logs(&app, clear, cli.json)?,
    }

    Ok(())
}

async fn generate(app: &App, args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    let size = match (args.size, args.aspect) {
        (Some(size), _) => size,
        (None, Some(aspect)) => {
            let provider = app.registry.resolve(&args.model)?;
            match provider.size_policy() {
                SizePolicy::Enumerated => provider.recommended_size(&args.model, aspect.ratio()),
                SizePolicy::Flexible => aspect.dimensions(),
            }
        }
        (None, None) => ImageSize::SQUARE_1024,
    };

    let mut input = GenerationInput::new(&args.prompt, &args.model)
        .with_size(size.to_string())
        .with_count(args.count);
    if let Some(negative) = args.negative {
        input = input.with_negative_prompt(negative);
    }
    if let Some(key) = args.api_key {
        input = input.with_api_key(key);
    }

    let generator = Generator::new(app.registry.clone(), Arc::new(app.logs()))
        .with_history(Arc::new(app.history()));
    let batch = match generator.generate(&input).await {
        Ok(batch) => batch,
        Err(e) if e.is_timeout() => {
            anyhow::bail!("{e}; the task may still finish, check the provider console later")
        }
        Err(e) => return Err(e.into()),
    };

    let mut saved = Vec::new();
    if let Some(dir) = &args.save_dir {
        std::fs::create_dir_all(dir)?;
        for (index, url) in batch.images.iter().enumerate() {
            if let Some(path) = save_inline_image(app.registry.blobs(), url, dir, index)? {
                saved.push(path.display().to_string());
            }
        }
    }

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "model": batch.entry.model,
            "size": batch.entry.size,
            "images": batch.images,
            "saved": saved,
            "duration_ms": batch.elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Generated {} image(s) with {} ({})", batch.images.len(), args.model, size);
        for url in &batch.images {
            if url.starts_with("data:") {
                println!("  <inline image, {} bytes encoded>", url.len());
            } else {
                println!("  {url}");
            }
        }
        for path in &saved {
            println!("Saved: {path}");
        }
        println!("Duration: {}ms", batch.elapsed.as_millis());
    }

    Ok(())
}

/// Writes `blob:` and `data:` images to `dir`; remote URLs are left alone.
fn save_inline_image(
    blobs: &BlobStore,
    url: &str,
    dir: &Path,
    index: usize,
) -> anyhow::Result<Option<PathBuf>> {
    let (bytes, extension) = if BlobStore::is_blob_url(url) {
        let blob = blobs
            .get(url)
            .with_context(|| format!("unknown object URL {url}"))?;
        let extension = blob.mime.rsplit('/').next().unwrap_or("bin").to_string();
        (blob.bytes, extension)
    } else if let Some(rest) = url.strip_prefix("data:") {
        let (mime, data) = rest
            .split_once(";base64,")
            .context("data URL is not base64 encoded")?;
        let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
        let extension = mime.rsplit('/').next().unwrap_or("bin").to_string();
        (bytes, extension)
    } else {
        return Ok(None);
    };

    let extension = if extension == "jpeg" { "jpg".to_string() } else { extension };
    let path = dir.join(format!("image-{}.{extension}", index + 1));
    std::fs::write(&path, bytes)?;
    Ok(Some(path))
}

fn list_models(json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(MODELS)?);
        return Ok(());
    }

    println!("Available models:\n");
    for provider in MODELS {
        println!("{} ({})", provider.name, provider.value);
        if let Some(var) = imagegate::config::env_var_for(provider.api_key_name) {
            println!("  API key: {} or `set-key {}`", var, provider.api_key_name);
        }
        for sub in provider.children {
            println!("  - {:<28} {:<30} {}", sub.value, sub.label, sub.price);
        }
        println!();
    }
    Ok(())
}

fn list_sizes(app: &App, model: &str, json_output: bool) -> anyhow::Result<()> {
    let provider = app.registry.resolve(model)?;
    let sizes = provider.supported_sizes(model);

    if json_output {
        let result = serde_json::json!({
            "model": model,
            "provider": provider.id(),
            "enumerated": provider.size_policy() == SizePolicy::Enumerated,
            "sizes": sizes.iter().map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Sizes for {} ({}):", model, provider.name());
        for size in &sizes {
            println!("  {size}");
        }
        if provider.size_policy() == SizePolicy::Flexible {
            println!("Any size with sides in 512-2048, multiples of 16, at most 2^21 pixels is accepted.");
        }
    }
    Ok(())
}

fn set_key(app: &App, key_name: &str, value: &str) -> anyhow::Result<()> {
    if !MODELS.iter().any(|p| p.api_key_name == key_name) {
        let known: Vec<_> = MODELS.iter().map(|p| p.api_key_name).collect();
        anyhow::bail!("unknown key name {key_name:?}, expected one of {}", known.join(", "));
    }

    let credentials = app.registry.credentials();
    if credentials.is_pinned(key_name) {
        eprintln!("{key_name} is pinned by the environment; the stored value will not be used");
    }
    credentials.set_api_key(key_name, value)?;
    println!("Stored {key_name}");
    Ok(())
}

fn show_history(app: &App, clear: bool, json_output: bool) -> anyhow::Result<()> {
    let history = app.history();
    if clear {
        history.clear();
        println!("History cleared");
        return Ok(());
    }

    let entries = history.entries();
    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No history");
    } else {
        for entry in &entries {
            let count = entry.image_count.unwrap_or(1);
            println!("[{}] {} {} x{}", entry.time, entry.model, entry.size, count);
            println!("  {}", entry.prompt);
            println!("  {}", entry.img_url);
        }
    }
    Ok(())
}

fn show_logs(app: &App, clear: bool, json_output: bool) -> anyhow::Result<()> {
    let logs = app.logs();
    if clear {
        logs.clear();
        println!("Logs cleared");
        return Ok(());
    }

    let entries = logs.entries();
    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            println!("{} {:?} {}", entry.timestamp, entry.kind, entry.data);
        }
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use generation::{Generator, GeneratorConfig, PollerEvent};
use providers::{GenerationRequest, ImagePayload, ProviderKind};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "reelgen-cli")]
#[command(about = "Reelgen CLI - Submit and track AI video-generation jobs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON); falls back to environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// History file override
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a video-generation job
    Generate {
        /// Model identifier (kling-2.5-turbo, veo-3.0-generate-001, fal-ai/...)
        #[arg(short, long)]
        model: String,

        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Source image for image-to-video
        #[arg(long)]
        image: Option<PathBuf>,

        /// Clip duration in seconds
        #[arg(long, default_value = "5")]
        duration: u32,

        /// Aspect ratio
        #[arg(long, default_value = "16:9")]
        aspect_ratio: String,

        /// Poll until the job resolves
        #[arg(long)]
        watch: bool,
    },

    /// One-shot status check for a task
    Status {
        /// Provider that owns the task (kling, veo, fal)
        #[arg(long)]
        provider: ProviderKind,

        /// Provider task identifier
        #[arg(long)]
        task_id: String,
    },

    /// Poll all processing jobs until none remain
    Watch,

    /// Cancel a processing job (local only; the provider keeps running)
    Cancel {
        /// History item id
        id: String,
    },

    /// Inspect or edit the generation history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// List configured providers and their availability
    Providers,
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List all history items, newest first
    List,

    /// Delete one item
    Delete { id: String },

    /// Delete everything
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => GeneratorConfig::from_env(),
    };
    if let Some(path) = cli.history {
        config = config.with_history_path(path);
    }
    let generator = Generator::from_config(&config);

    match cli.command {
        Commands::Generate {
            model,
            prompt,
            image,
            duration,
            aspect_ratio,
            watch,
        } => generate_command(&generator, model, prompt, image, duration, aspect_ratio, watch).await,
        Commands::Status { provider, task_id } => {
            status_command(&generator, provider, task_id).await
        }
        Commands::Watch => watch_command(&generator).await,
        Commands::Cancel { id } => cancel_command(&generator, id),
        Commands::History { command } => match command {
            HistoryCommands::List => list_command(&generator),
            HistoryCommands::Delete { id } => {
                generator.delete(&id)?;
                info!("Deleted history item {}", id);
                Ok(())
            }
            HistoryCommands::Clear => {
                generator.clear()?;
                info!("History cleared");
                Ok(())
            }
        },
        Commands::Providers => providers_command(&generator).await,
    }
}

async fn generate_command(
    generator: &Generator,
    model: String,
    prompt: String,
    image: Option<PathBuf>,
    duration: u32,
    aspect_ratio: String,
    watch: bool,
) -> Result<()> {
    let mut request = GenerationRequest::new(model, prompt)
        .with_duration(duration)
        .with_aspect_ratio(aspect_ratio);

    if let Some(path) = image {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("reading image {}", path.display()))?;
        request = request.with_image(ImagePayload::Bytes(bytes));
    }

    let item = generator.submit(request).await?;
    info!(
        "Submitted: history item {} (task {})",
        item.id,
        item.task_id.as_deref().unwrap_or("-")
    );

    if watch {
        watch_command(generator).await?;
    }
    Ok(())
}

async fn status_command(
    generator: &Generator,
    provider: ProviderKind,
    task_id: String,
) -> Result<()> {
    let report = generator.check_status(provider, &task_id).await?;
    println!("status: {}", report.status);
    if let Some(url) = report.video_url {
        println!("video:  {}", url);
    }
    if let Some(message) = report.message {
        println!("detail: {}", message);
    }
    Ok(())
}

async fn watch_command(generator: &Generator) -> Result<()> {
    let active = generator.store().processing()?;
    if active.is_empty() {
        info!("No processing jobs to watch");
        return Ok(());
    }
    info!("Watching {} job(s)", active.len());

    let mut handle = generator.start_poller();
    while let Some(event) = handle.recv().await {
        match event {
            PollerEvent::Completed { id, media_uri } => {
                info!("Completed {}: {}", id, media_uri);
            }
            PollerEvent::Failed { id, error } => {
                warn!("Failed {}: {}", id, error);
            }
            PollerEvent::GaveUp {
                consecutive_failures,
            } => {
                warn!(
                    "Giving up after {} consecutive failed poll rounds",
                    consecutive_failures
                );
            }
        }
    }
    Ok(())
}

fn cancel_command(generator: &Generator, id: String) -> Result<()> {
    let item = generator.cancel(&id)?;
    info!("Cancelled {}: status is now {}", item.id, item.status);
    Ok(())
}

fn list_command(generator: &Generator) -> Result<()> {
    let items = generator.history()?;
    if items.is_empty() {
        println!("history is empty");
        return Ok(());
    }

    println!(
        "{:<18} {:<10} {:<17} {:<24} media",
        "id", "status", "created", "prompt"
    );
    for item in items {
        let created = chrono::DateTime::from_timestamp(item.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| item.created_at.to_string());
        let mut prompt = item.description.clone();
        if prompt.chars().count() > 22 {
            prompt = prompt.chars().take(21).collect();
            prompt.push('…');
        }
        println!(
            "{:<18} {:<10} {:<17} {:<24} {}",
            item.id,
            item.status.to_string(),
            created,
            prompt,
            item.media_uri.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn providers_command(generator: &Generator) -> Result<()> {
    if generator.registry().is_empty() {
        warn!("No providers configured; set KLING_API_KEY, GOOGLE_API_KEY or FAL_API_KEY");
        return Ok(());
    }
    for provider in generator.registry().all() {
        let available = provider.is_available().await;
        println!(
            "{:<12} {:<8} {}",
            provider.name(),
            provider.kind().to_string(),
            if available { "available" } else { "unreachable" }
        );
    }
    Ok(())
}

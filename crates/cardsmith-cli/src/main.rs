use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cardsmith_contracts::card::GenerationRequest;
use cardsmith_contracts::scenario::Scenario;
use cardsmith_engine::composer::ChatCompletionsClient;
use cardsmith_engine::{
    ArtifactStore, CardPipeline, DeterministicCompositor, MessageComposer, MessageInputs,
    PipelineConfig,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "cardsmith", version, about = "Festive card generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate image and message for one card and print the preview.
    Preview(PreviewArgs),
    /// Compose only the greeting text.
    Message(MessageArgs),
    /// Build the deterministic composite from two photos.
    Composite(CompositeArgs),
    /// Normalise an uploaded profile photo.
    Portrait(PortraitArgs),
    /// List the festive scenarios, or describe one by slug.
    Scenarios(ScenariosArgs),
}

#[derive(Debug, Parser)]
struct ScenariosArgs {
    /// Slug such as `ice_skating` (dashes and case are ignored).
    slug: Option<String>,
}

#[derive(Debug, Parser)]
struct PreviewArgs {
    #[arg(long)]
    sender_photo: String,
    #[arg(long)]
    recipient_photo: String,
    #[arg(long)]
    sender_name: String,
    #[arg(long)]
    recipient_name: String,
    #[arg(long)]
    message: String,
    #[arg(long)]
    word: String,
    #[arg(long)]
    content_dir: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    receipts: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Parser)]
struct MessageArgs {
    #[arg(long)]
    message: String,
    #[arg(long)]
    word: String,
    #[arg(long)]
    sender_name: String,
    #[arg(long)]
    recipient_name: String,
}

#[derive(Debug, Parser)]
struct CompositeArgs {
    #[arg(long)]
    left: String,
    #[arg(long)]
    right: String,
    #[arg(long)]
    content_dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct PortraitArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    owner: String,
    #[arg(long)]
    content_dir: Option<PathBuf>,
}

fn main() {
    init_logging();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("cardsmith error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Preview(args) => run_preview(args),
        Command::Message(args) => run_message(args),
        Command::Composite(args) => run_composite(args),
        Command::Portrait(args) => run_portrait(args),
        Command::Scenarios(args) => run_scenarios(args),
    }
}

fn run_scenarios(args: ScenariosArgs) -> Result<i32> {
    let Some(raw) = args.slug else {
        for scenario in Scenario::ALL {
            println!("{}\t{}", scenario.slug(), scenario.description());
        }
        return Ok(0);
    };
    match Scenario::from_slug(&raw) {
        Some(scenario) => {
            println!("{}", scenario.description());
            Ok(0)
        }
        None => {
            eprintln!("cardsmith: unknown scenario '{raw}'");
            Ok(2)
        }
    }
}

fn load_config(content_dir: Option<PathBuf>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("failed reading configuration")?;
    if let Some(dir) = content_dir {
        config.content_dir = dir;
    }
    Ok(config)
}

fn store_for(config: &PipelineConfig) -> ArtifactStore {
    ArtifactStore::new(&config.content_dir, &config.public_prefix)
        .with_file_prefix(&config.artifact_prefix)
}

/// Photo refs may be plain file paths or public `{prefix}/{file}` paths
/// previously handed out by the store.
fn resolve_photo(store: &ArtifactStore, raw: &str) -> PathBuf {
    let direct = Path::new(raw);
    if direct.exists() {
        return direct.to_path_buf();
    }
    match store.resolve(raw) {
        Some(resolved) => {
            debug!(photo = raw, path = %resolved.display(), "resolved public photo path");
            resolved
        }
        None => direct.to_path_buf(),
    }
}

fn run_preview(args: PreviewArgs) -> Result<i32> {
    let mut config = load_config(args.content_dir)?;
    if args.events.is_some() {
        config.events_path = args.events;
    }
    if args.receipts.is_some() {
        config.receipts_dir = args.receipts;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    let store = store_for(&config);
    let request = GenerationRequest {
        sender_photo: resolve_photo(&store, &args.sender_photo),
        recipient_photo: resolve_photo(&store, &args.recipient_photo),
        sender_name: args.sender_name,
        recipient_name: args.recipient_name,
        personal_message: args.message,
        recipient_word: args.word,
    };

    let pipeline = CardPipeline::from_config(&config)?;
    let preview = pipeline.preview(&request)?;
    println!("{}", serde_json::to_string_pretty(&preview.to_json())?);
    if preview.result.has_image() {
        Ok(0)
    } else {
        eprintln!("cardsmith: no image available for this card");
        Ok(2)
    }
}

fn run_message(args: MessageArgs) -> Result<i32> {
    let config = load_config(None)?;
    let composer = match config.text.clone() {
        Some(settings) => MessageComposer::new(Some(std::sync::Arc::new(
            ChatCompletionsClient::new(settings, config.request_timeout),
        ))),
        None => MessageComposer::default(),
    };
    let composed = composer.compose(&MessageInputs {
        personal_message: &args.message,
        recipient_word: &args.word,
        sender_name: &args.sender_name,
        recipient_name: &args.recipient_name,
    });
    println!("{}", composed.text);
    Ok(0)
}

fn run_composite(args: CompositeArgs) -> Result<i32> {
    let config = load_config(args.content_dir)?;
    let store = store_for(&config);
    let left = resolve_photo(&store, &args.left);
    let right = resolve_photo(&store, &args.right);
    let stored = DeterministicCompositor::default().compose_to_store(&left, &right, &store)?;
    println!(
        "{}",
        json!({
            "image_path": stored.public_path,
            "file_path": stored.file_path.display().to_string(),
        })
    );
    Ok(0)
}

fn run_portrait(args: PortraitArgs) -> Result<i32> {
    let config = load_config(args.content_dir)?;
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed reading {}", args.input.display()))?;
    let stored = store_for(&config).store_portrait(&bytes, &args.owner)?;
    println!("{}", stored.public_path);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{run_scenarios, Cli, Command, ScenariosArgs};

    #[test]
    fn scenario_lookup_accepts_dashed_slugs_and_rejects_unknown_ones() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["cardsmith", "scenarios", "Ice-Skating"])?;
        let Command::Scenarios(args) = cli.command else {
            panic!("expected the scenarios command");
        };
        assert_eq!(run_scenarios(args)?, 0);

        let unknown = ScenariosArgs {
            slug: Some("surfing".to_string()),
        };
        assert_eq!(run_scenarios(unknown)?, 2);
        Ok(())
    }
}

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use lookalike::{builder, config, store::EmbeddingStore, Pipeline};

#[derive(Parser)]
#[command(name = "lookalike")]
#[command(version, about = "Face similarity search - who do I resemble?")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the embedding database from per-identity reference folders
    Build {
        /// Root directory of per-identity image folders (defaults to config)
        #[arg(short, long)]
        reference_dir: Option<PathBuf>,
        /// Maximum images embedded per identity
        #[arg(short, long)]
        max_images: Option<usize>,
    },
    /// Rank the most similar identities for a photo
    Query {
        /// Photo to match
        image: PathBuf,
        /// Number of identities to return
        #[arg(short, long)]
        top_k: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(None)?;

    match cli.command {
        Commands::Build {
            reference_dir,
            max_images,
        } => build(&cfg, reference_dir, max_images),
        Commands::Query {
            image,
            top_k,
            json,
        } => query(&cfg, &image, top_k, json),
        Commands::Config => open_config(),
    }
}

fn build(
    cfg: &config::Config,
    reference_dir: Option<PathBuf>,
    max_images: Option<usize>,
) -> Result<()> {
    let root = reference_dir.unwrap_or_else(|| cfg.reference_dir.clone());
    let cap = max_images.unwrap_or(cfg.max_images_per_identity);

    info!("building embedding database from {}", root.display());

    let mut pipeline = Pipeline::new(&cfg.detector_model, &cfg.encoder_model)
        .context("initializing face recognition pipeline")?;

    let (store, stats) = builder::build(&mut pipeline, &root, cap)?;

    if store.is_empty() {
        anyhow::bail!(
            "no embeddings were produced; check that {} contains per-identity folders with face photos",
            root.display()
        );
    }

    store
        .save(&cfg.database)
        .context("saving embedding database")?;
    let size = std::fs::metadata(&cfg.database).map(|m| m.len()).unwrap_or(0);

    info!("database build complete");
    info!("  identities processed: {}", stats.identities_processed);
    info!("  images embedded:      {}", stats.images_embedded);
    info!("  images failed:        {}", stats.images_failed);
    info!("  saved to {} ({} bytes)", cfg.database.display(), size);
    Ok(())
}

fn query(cfg: &config::Config, image: &Path, top_k: Option<usize>, json: bool) -> Result<()> {
    // A missing or corrupt database is fatal; no queries are servable.
    let store = EmbeddingStore::load(&cfg.database)?;
    info!("loaded database with {} identities", store.identities());

    let mut pipeline = Pipeline::new(&cfg.detector_model, &cfg.encoder_model)
        .context("initializing face recognition pipeline")?;

    let top_k = top_k.unwrap_or(cfg.top_k);
    let results = lookalike::predict(&mut pipeline, &store, image, top_k)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        info!("no matches found");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!(
            "{:>2}. {:<30} {:>7.2}%  ({})",
            i + 1,
            result.identity,
            result.similarity,
            result.source.display()
        );
    }
    Ok(())
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}

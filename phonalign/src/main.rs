//! phonalign - acoustic-model training and phonetic alignment
//!
//! Reads a TOML training configuration, prepares the corpus in a working
//! directory and drives the engine tools through the selected pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use phonalign::engine::ProcessEngine;
use phonalign::PipelineVariant;
use phonalign_common::config::{resolve_config_path, resolve_working_dir, TrainingConfig};
use tracing::info;

/// Command-line arguments for phonalign
#[derive(Parser, Debug)]
#[command(name = "phonalign")]
#[command(about = "Acoustic-model training and phonetic alignment")]
#[command(version)]
struct Args {
    /// Training configuration file
    #[arg(short, long, env = "PHONALIGN_CONFIG")]
    config: Option<PathBuf>,

    /// Pipeline to run
    #[arg(short, long, value_enum, default_value = "align")]
    method: PipelineVariant,

    /// Working directory (overrides the configuration file)
    #[arg(short, long, env = "PHONALIGN_WORKING_DIR")]
    working_dir: Option<PathBuf>,

    /// Log level (overrides [logging].level)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())
        .context("Failed to locate configuration")?;
    let config = TrainingConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    phonalign_common::logging::init(&level);

    let working_dir = resolve_working_dir(args.working_dir.as_deref(), &config)
        .context("Failed to resolve working directory")?;

    info!("Starting phonalign v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_path.display());
    info!("Working directory: {}", working_dir.display());

    let engine = Arc::new(ProcessEngine::new(config.engine.bin_dir.clone()));
    let state = phonalign::run_training(&config, &working_dir, args.method, engine)
        .await
        .context("Training failed")?;

    info!(
        iteration = state.iteration,
        units = state.inventory.len(),
        "Done"
    );
    Ok(())
}

//! Logolabel CLI - zero-shot bounding-box labeling for logo datasets.
//!
//! Labels a folder of raw images with a general-purpose detector and a
//! vision-language matcher, then splits the labeled images into YOLO
//! `train.txt` / `val.txt` manifests.
//!
//! # Usage
//!
//! ```bash
//! # Label data/input/raw and split into data/input/{train,val}.txt
//! logolabel label
//!
//! # Label a custom directory with a stricter acceptance threshold
//! logolabel label ./photos --labels-dir ./labels --positive-threshold 0.8
//!
//! # Re-split existing labels with a new seed, without re-running the models
//! logolabel split --seed 7
//!
//! # View configuration
//! logolabel config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Logolabel - zero-shot logo labeling and dataset preparation.
#[derive(Parser, Debug)]
#[command(name = "logolabel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the platform default
    #[arg(short, long, global = true, env = "LOGOLABEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Label a directory of images and split them into train/val manifests
    Label(cli::label::LabelArgs),

    /// Re-split previously labeled images without running the models
    Split(cli::split::SplitArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let (config, warning) = cli::startup_config(config_path);
    if let Some(warning) = warning {
        eprintln!("{warning}");
    }
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Logolabel v{}", logolabel_core::VERSION);

    match cli.command {
        Commands::Label(args) => cli::label::execute(args, config_path).await,
        Commands::Split(args) => cli::split::execute(args, config_path).await,
        Commands::Config(args) => cli::config::execute(args, config_path).await,
    }
}

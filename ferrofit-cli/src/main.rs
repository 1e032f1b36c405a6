//! Ferrofit CLI: pick the best regression model for a train/test split.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Ferrofit: train a catalog of regressors and keep the best one
#[derive(Parser, Debug)]
#[command(name = "ferrofit", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds ferrofit.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train every catalog model and save the best one
    Train {
        /// Training CSV (target in the last column)
        #[arg(long)]
        train: PathBuf,
        /// Test CSV (same columns as the training file)
        #[arg(long)]
        test: PathBuf,
        /// Where to write the selected model
        #[arg(long)]
        artifact: Option<PathBuf>,
        /// Minimum test R² for the best model
        #[arg(long)]
        threshold: Option<f64>,
        /// The CSV files have no header row
        #[arg(long)]
        no_headers: bool,
    },
    /// Predict targets with a saved model
    Predict {
        /// Model artifact written by `train`
        #[arg(long)]
        model: PathBuf,
        /// Feature CSV (no target column)
        #[arg(long)]
        input: PathBuf,
        /// The CSV file has no header row
        #[arg(long)]
        no_headers: bool,
    },
    /// Print the model catalog and its search grids
    Catalog,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());
    let mut config = ferrofit_ml::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let mut _guard = None;
    let json_layer = if config.logging.json_file {
        let log_dir = workspace.join(&config.logging.log_dir);
        std::fs::create_dir_all(&log_dir)?;
        let file_name = chrono::Local::now().format("%m_%d_%Y_%H_%M_%S.log").to_string();
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug")),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    match cli.command {
        Commands::Train {
            train,
            test,
            artifact,
            threshold,
            no_headers,
        } => {
            // Apply CLI overrides
            if let Some(path) = artifact {
                config.trainer.artifact_path = path;
            } else if config.trainer.artifact_path.is_relative() {
                config.trainer.artifact_path = workspace.join(&config.trainer.artifact_path);
            }
            if let Some(threshold) = threshold {
                config.trainer.score_threshold = threshold;
            }
            commands::train(&config.trainer, &train, &test, !no_headers)
        }
        Commands::Predict {
            model,
            input,
            no_headers,
        } => commands::predict(&model, &input, !no_headers),
        Commands::Catalog => commands::catalog(&config.trainer),
    }
}

//! Configuration for Ferrofit.
//!
//! Uses `figment` for layered configuration: defaults -> workspace file ->
//! explicit file -> environment. The workspace file is `ferrofit.toml` in the
//! workspace directory; environment variables use the `FERROFIT_` prefix with
//! `__` separating nested keys (e.g. `FERROFIT_TRAINER__SCORE_THRESHOLD=0.7`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-level configuration file.
pub const CONFIG_FILE_NAME: &str = "ferrofit.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FerrofitConfig {
    /// Model trainer configuration.
    #[serde(default)]
    pub trainer: TrainerConfig,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model trainer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Where the winning fitted estimator is written.
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,
    /// Minimum test R² the best model must reach.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Folds used by grid search cross-validation.
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Seed handed to every randomized estimator.
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    /// Evaluate catalog entries on the rayon thread pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            score_threshold: default_score_threshold(),
            cv_folds: default_cv_folds(),
            random_state: default_random_state(),
            parallel: true,
        }
    }
}

fn default_artifact_path() -> PathBuf {
    Path::new("artifacts").join("model.json")
}

fn default_score_threshold() -> f64 {
    0.6
}

fn default_cv_folds() -> usize {
    3
}

fn default_random_state() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving one JSON log file per run.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Write the JSON log file at all.
    #[serde(default = "default_true")]
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            json_file: true,
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Load configuration from all layers.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `FERROFIT_`)
/// 2. Explicit config file (`--config`)
/// 3. Workspace config (`<workspace>/ferrofit.toml`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<FerrofitConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(FerrofitConfig::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join(CONFIG_FILE_NAME);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("FERROFIT_").split("__"));

    let config: FerrofitConfig = figment.extract().map_err(Box::new)?;
    if config.trainer.cv_folds < 2 {
        return Err(Box::new(figment::Error::from(format!(
            "trainer.cv_folds must be at least 2, got {}",
            config.trainer.cv_folds
        ))));
    }
    Ok(config)
}

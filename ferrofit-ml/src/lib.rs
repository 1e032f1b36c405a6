//! # ferrofit-ml: regression model selection
//!
//! Trains a fixed catalog of regression estimators on a training split,
//! scores each on a held-out test split with R², and persists the winner.
//!
//! ```no_run
//! use ferrofit_ml::{ModelTrainer, TrainerConfig};
//! use ndarray::Array2;
//!
//! let train = Array2::from_shape_fn((40, 2), |(i, j)| (i * (j + 1)) as f64);
//! let test = Array2::from_shape_fn((10, 2), |(i, j)| (i * (j + 1)) as f64 + 0.5);
//! let score = ModelTrainer::new(TrainerConfig::default())
//!     .initiate_model_trainer(train.view(), test.view())?;
//! # Ok::<(), ferrofit_ml::TrainerError>(())
//! ```

// Foundation
pub mod config;
pub mod error;

// Data & scoring
pub mod data;
pub mod metrics;

// Estimators & search
pub mod estimators;
pub mod search;

// Selection pipeline
pub mod artifact;
pub mod catalog;
pub mod evaluate;
pub mod predict;
pub mod trainer;

// Re-exports
pub use artifact::{ModelArtifact, load_artifact, save_artifact};
pub use catalog::{ModelCatalog, ParamGrids, default_param_grids};
pub use config::{FerrofitConfig, LoggingConfig, TrainerConfig, load_config};
pub use error::{MlError, Stage, TrainerError};
pub use estimators::{Estimator, Params, Regressor};
pub use evaluate::{EvaluationOptions, ModelReport, ModelScore, evaluate_models};
pub use metrics::{RegressionMetrics, r2_score};
pub use predict::PredictPipeline;
pub use search::{GridSearch, KFold, ParamGrid};
pub use trainer::{ModelTrainer, TrainingOutcome};

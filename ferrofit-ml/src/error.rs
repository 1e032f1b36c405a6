//! Error types for the ferrofit-ml crate.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Top-level error type for ML operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter '{name}' for {estimator}: {reason}")]
    InvalidParam {
        estimator: String,
        name: String,
        reason: String,
    },

    #[error("Model is not fitted")]
    NotFitted,

    #[error("Training error: {0}")]
    Training(String),

    #[error("No best model found: best score {best_score:.4} is below threshold {threshold}")]
    NoBestModel { best_score: f64, threshold: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Shape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_param(
        estimator: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParam {
            estimator: estimator.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = MlError> = std::result::Result<T, E>;

/// Pipeline stage in which a [`TrainerError`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SplitData,
    EvaluateModels,
    SelectBest,
    SaveArtifact,
    LoadArtifact,
    Predict,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SplitData => "split data",
            Self::EvaluateModels => "evaluate models",
            Self::SelectBest => "select best model",
            Self::SaveArtifact => "save artifact",
            Self::LoadArtifact => "load artifact",
            Self::Predict => "predict",
        };
        f.write_str(name)
    }
}

/// Application-level error returned by [`crate::trainer::ModelTrainer`] and
/// [`crate::predict::PredictPipeline`].
///
/// Every failure in the pipeline, including the "no best model" condition,
/// is reported through this one type. The cause is kept as `source`, next to
/// the stage and source location of the failing step.
#[derive(Debug, Error)]
#[error(
    "error in {stage} at {}:{}: {source}",
    .location.file(),
    .location.line()
)]
pub struct TrainerError {
    pub stage: Stage,
    pub location: &'static Location<'static>,
    #[source]
    pub source: MlError,
}

impl TrainerError {
    #[track_caller]
    pub fn new(stage: Stage, source: MlError) -> Self {
        Self {
            stage,
            location: Location::caller(),
            source,
        }
    }

    pub fn cause(&self) -> &MlError {
        &self.source
    }

    pub fn is_no_best_model(&self) -> bool {
        matches!(self.source, MlError::NoBestModel { .. })
    }
}

/// Attach a pipeline stage and the caller's location to an [`MlError`].
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, TrainerError>;
}

impl<T> StageExt<T> for Result<T, MlError> {
    #[track_caller]
    fn stage(self, stage: Stage) -> Result<T, TrainerError> {
        match self {
            Ok(value) => Ok(value),
            Err(source) => Err(TrainerError::new(stage, source)),
        }
    }
}

//! Inference from a saved model artifact.

use crate::artifact::{ModelArtifact, load_artifact};
use crate::data::ensure_finite;
use crate::error::{Stage, StageExt, TrainerError};
use ndarray::{Array1, Array2};
use std::path::Path;
use tracing::debug;

pub struct PredictPipeline {
    artifact: ModelArtifact,
}

impl PredictPipeline {
    pub fn load(path: &Path) -> Result<Self, TrainerError> {
        let artifact = load_artifact(path).stage(Stage::LoadArtifact)?;
        debug!(model = %artifact.name, path = %path.display(), "Loaded model artifact");
        Ok(Self { artifact })
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Predict one target per row of `features`.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>, TrainerError> {
        ensure_finite(features.view()).stage(Stage::Predict)?;
        self.artifact.predict(features).stage(Stage::Predict)
    }
}

//! Persistence of the selected model.

use crate::error::{MlError, Result};
use crate::estimators::{Estimator, Params, Regressor};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The winning fitted estimator and what it was selected with.
///
/// Holds no timestamps or run identifiers, so two identical training runs
/// write identical files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub params: Params,
    /// Test R² at selection time.
    pub score: f64,
    pub n_features: usize,
    pub estimator: Estimator,
}

impl ModelArtifact {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(MlError::shape(
                format!("{} features", self.n_features),
                format!("{} features", x.ncols()),
            ));
        }
        self.estimator.predict(x)
    }
}

/// Write `artifact` as pretty JSON, replacing any previous file atomically.
pub fn save_artifact(path: &Path, artifact: &ModelArtifact) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(artifact)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

pub fn load_artifact(path: &Path) -> Result<ModelArtifact> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

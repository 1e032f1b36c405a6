//! Best-model selection over the regression catalog.

use crate::artifact::{ModelArtifact, save_artifact};
use crate::catalog::{ModelCatalog, ParamGrids, default_param_grids};
use crate::config::TrainerConfig;
use crate::data::split_features_target;
use crate::error::{MlError, Stage, StageExt, TrainerError};
use crate::estimators::Regressor;
use crate::evaluate::{EvaluationOptions, ModelReport, evaluate_models};
use ndarray::ArrayView2;
use std::path::PathBuf;
use tracing::info;

/// Result of a successful [`ModelTrainer::train`] run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub best_model: String,
    pub best_score: f64,
    pub report: ModelReport,
    pub artifact_path: PathBuf,
}

/// Trains every catalog entry, keeps the best one, and writes it to disk.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainerConfig,
    catalog: ModelCatalog,
    grids: ParamGrids,
}

impl ModelTrainer {
    /// Trainer over the default catalog and grids.
    pub fn new(config: TrainerConfig) -> Self {
        let catalog = ModelCatalog::default_catalog(config.random_state);
        Self {
            config,
            catalog,
            grids: default_param_grids(),
        }
    }

    /// Replace the candidate catalog and its grids.
    pub fn with_catalog(mut self, catalog: ModelCatalog, grids: ParamGrids) -> Self {
        self.catalog = catalog;
        self.grids = grids;
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Train on `train`, score on `test`, and persist the best model.
    ///
    /// Both matrices carry the target in their last column. The artifact is
    /// written only when the best test R² reaches the configured threshold.
    pub fn train(
        &self,
        train: ArrayView2<'_, f64>,
        test: ArrayView2<'_, f64>,
    ) -> Result<TrainingOutcome, TrainerError> {
        info!("splitting training and test input data");
        if train.ncols() != test.ncols() {
            return Err(MlError::shape(
                format!("test data with {} columns", train.ncols()),
                format!("{} columns", test.ncols()),
            ))
            .stage(Stage::SplitData);
        }
        let (x_train, y_train) = split_features_target(train).stage(Stage::SplitData)?;
        let (x_test, y_test) = split_features_target(test).stage(Stage::SplitData)?;

        let options = EvaluationOptions {
            cv_folds: self.config.cv_folds,
            parallel: self.config.parallel,
        };
        let report = evaluate_models(
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            &self.catalog,
            &self.grids,
            options,
        )
        .stage(Stage::EvaluateModels)?;

        let best = report
            .best()
            .ok_or_else(|| MlError::training("no model produced a test score"))
            .stage(Stage::SelectBest)?;
        let best_score = best.score.test_score;
        if best_score < self.config.score_threshold {
            return Err(MlError::NoBestModel {
                best_score,
                threshold: self.config.score_threshold,
            })
            .stage(Stage::SelectBest);
        }
        info!(
            model = %best.score.name,
            score = best_score,
            "Best model found on both training and testing dataset"
        );

        let artifact = ModelArtifact {
            name: best.score.name.clone(),
            params: best.estimator.params(),
            score: best_score,
            n_features: x_train.ncols(),
            estimator: best.estimator.clone(),
        };
        let path = &self.config.artifact_path;
        save_artifact(path, &artifact).stage(Stage::SaveArtifact)?;
        info!(path = %path.display(), "Saved model artifact");

        Ok(TrainingOutcome {
            best_model: artifact.name,
            best_score,
            report,
            artifact_path: path.clone(),
        })
    }

    /// Run [`ModelTrainer::train`] and return only the best test R².
    pub fn initiate_model_trainer(
        &self,
        train: ArrayView2<'_, f64>,
        test: ArrayView2<'_, f64>,
    ) -> Result<f64, TrainerError> {
        self.train(train, test).map(|outcome| outcome.best_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{Estimator, LinearRegression};
    use ndarray::Array2;

    fn config(dir: &std::path::Path) -> TrainerConfig {
        TrainerConfig {
            artifact_path: dir.join("model.json"),
            ..TrainerConfig::default()
        }
    }

    fn linear_only() -> (ModelCatalog, ParamGrids) {
        (
            ModelCatalog::new().with("Linear Regression", Estimator::LinearRegression(LinearRegression::new())),
            ParamGrids::new(),
        )
    }

    #[test]
    fn test_mismatched_columns_fail_in_split_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, grids) = linear_only();
        let trainer = ModelTrainer::new(config(dir.path())).with_catalog(catalog, grids);
        let train = Array2::<f64>::zeros((4, 3));
        let test = Array2::<f64>::zeros((2, 2));
        let err = trainer.train(train.view(), test.view()).unwrap_err();
        assert_eq!(err.stage, Stage::SplitData);
        assert!(matches!(err.cause(), MlError::Shape { .. }));
        assert!(!dir.path().join("model.json").exists());
    }

    #[test]
    fn test_single_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = ModelTrainer::new(config(dir.path()));
        let train = Array2::<f64>::zeros((4, 1));
        let err = trainer.initiate_model_trainer(train.view(), train.view()).unwrap_err();
        assert_eq!(err.stage, Stage::SplitData);
        assert!(err.location.file().ends_with("trainer.rs"));
    }

    #[test]
    fn test_threshold_applies_to_best_score() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, grids) = linear_only();
        let trainer = ModelTrainer::new(TrainerConfig {
            score_threshold: 1.5,
            ..config(dir.path())
        })
        .with_catalog(catalog, grids);
        let train = Array2::from_shape_fn((10, 2), |(i, j)| if j == 0 { i as f64 } else { 3.0 * i as f64 });
        let err = trainer.train(train.view(), train.view()).unwrap_err();
        assert!(err.is_no_best_model());
        assert_eq!(err.stage, Stage::SelectBest);
        assert!(!dir.path().join("model.json").exists());
    }
}

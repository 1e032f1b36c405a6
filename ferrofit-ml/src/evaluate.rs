//! Fit every catalog entry and score it on held-out data.

use crate::catalog::{ModelCatalog, ParamGrids};
use crate::error::Result;
use crate::estimators::{Estimator, Params, Regressor};
use crate::metrics::{RegressionMetrics, r2_score};
use crate::search::{GridSearch, KFold};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

/// Options for [`evaluate_models`].
#[derive(Debug, Clone, Copy)]
pub struct EvaluationOptions {
    pub cv_folds: usize,
    pub parallel: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            cv_folds: 3,
            parallel: true,
        }
    }
}

/// Scores of one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelScore {
    pub name: String,
    pub train_score: f64,
    pub test_score: f64,
    /// MSE, RMSE, MAE and R² on the test split.
    pub test_metrics: RegressionMetrics,
    /// Parameters chosen by grid search; empty when no search ran.
    pub best_params: Params,
    /// Mean cross-validation R² of the chosen parameters.
    pub cv_score: Option<f64>,
}

/// A scored catalog entry together with its fitted estimator.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub score: ModelScore,
    pub estimator: Estimator,
}

/// Per-model results in catalog order.
#[derive(Debug, Clone, Default)]
pub struct ModelReport {
    models: Vec<FittedModel>,
}

impl ModelReport {
    pub fn models(&self) -> &[FittedModel] {
        &self.models
    }

    pub fn scores(&self) -> impl Iterator<Item = &ModelScore> {
        self.models.iter().map(|m| &m.score)
    }

    /// Test score by model name.
    pub fn test_score(&self, name: &str) -> Option<f64> {
        self.scores()
            .find(|s| s.name == name)
            .map(|s| s.test_score)
    }

    /// The entry with the highest test score. The first one wins a tie.
    pub fn best(&self) -> Option<&FittedModel> {
        let mut best: Option<&FittedModel> = None;
        for model in self.models.iter().filter(|m| !m.score.test_score.is_nan()) {
            if best.is_none_or(|b| model.score.test_score > b.score.test_score) {
                best = Some(model);
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Fit each catalog entry on the training split and score it on the test split.
///
/// Entries with a non-empty grid are tuned by cross-validated grid search
/// before the final fit. Any entry failing fails the whole evaluation.
pub fn evaluate_models(
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
    catalog: &ModelCatalog,
    grids: &ParamGrids,
    options: EvaluationOptions,
) -> Result<ModelReport> {
    let evaluate = |index: usize| -> Result<FittedModel> {
        let entry = &catalog.entries()[index];
        let grid = grids.get(&entry.name).filter(|g| !g.is_empty());

        let (estimator, best_params, cv_score) = match grid {
            Some(grid) => {
                let search = GridSearch::new(&entry.estimator, grid)
                    .with_cv(KFold::new(options.cv_folds))
                    .fit(x_train, y_train)?;
                debug!(
                    model = %entry.name,
                    candidates = search.candidates.len(),
                    cv_score = search.best_score,
                    "Grid search finished"
                );
                (search.estimator, search.best_params, Some(search.best_score))
            }
            None => {
                let mut estimator = entry.estimator.clone();
                estimator.fit(x_train, y_train)?;
                (estimator, Params::new(), None)
            }
        };

        let train_score = r2_score(y_train, &estimator.predict(x_train)?)?;
        let test_metrics = RegressionMetrics::compute(y_test, &estimator.predict(x_test)?)?;
        let test_score = test_metrics.r_squared;
        info!(
            model = %entry.name,
            train_score,
            test_score,
            test_mae = test_metrics.mae,
            "Evaluated model"
        );

        Ok(FittedModel {
            score: ModelScore {
                name: entry.name.clone(),
                train_score,
                test_score,
                test_metrics,
                best_params,
                cv_score,
            },
            estimator,
        })
    };

    let models: Vec<FittedModel> = if options.parallel {
        (0..catalog.len())
            .into_par_iter()
            .map(evaluate)
            .collect::<Result<_>>()?
    } else {
        (0..catalog.len()).map(evaluate).collect::<Result<_>>()?
    };

    Ok(ModelReport { models })
}

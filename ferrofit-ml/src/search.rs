//! Exhaustive hyperparameter search with k-fold cross-validation.

use crate::error::{MlError, Result};
use crate::estimators::{Estimator, Params, Regressor};
use crate::metrics::r2_score;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Candidate values per hyperparameter.
///
/// Keys are kept sorted, so the expansion order of [`ParamGrid::candidates`]
/// does not depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid(BTreeMap<String, Vec<Value>>);

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the candidate values of one hyperparameter.
    pub fn with<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.0
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of combinations the grid expands to.
    pub fn n_candidates(&self) -> usize {
        if self.0.is_empty() {
            return 0;
        }
        self.0.values().map(Vec::len).product()
    }

    /// Cartesian product of all values, last key varying fastest.
    pub fn candidates(&self) -> Vec<Params> {
        if self.0.is_empty() {
            return Vec::new();
        }
        let mut configs = vec![Params::new()];
        for (key, values) in &self.0 {
            let mut expanded = Vec::with_capacity(configs.len() * values.len());
            for config in &configs {
                for value in values {
                    let mut c = config.clone();
                    c.insert(key.clone(), value.clone());
                    expanded.push(c);
                }
            }
            configs = expanded;
        }
        configs
    }
}

/// Contiguous, unshuffled k-fold splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
}

impl Default for KFold {
    fn default() -> Self {
        Self { n_splits: 3 }
    }
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// `(train, validation)` index sets for `n_samples` rows.
    ///
    /// The first `n_samples % n_splits` folds hold one extra row.
    pub fn split(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        if self.n_splits < 2 {
            return Err(MlError::invalid_input(format!(
                "k-fold needs at least 2 splits, got {}",
                self.n_splits
            )));
        }
        if n_samples < self.n_splits {
            return Err(MlError::invalid_input(format!(
                "cannot split {n_samples} samples into {} folds",
                self.n_splits
            )));
        }

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            let validation: Vec<usize> = (start..start + size).collect();
            let train: Vec<usize> = (0..start).chain(start + size..n_samples).collect();
            folds.push((train, validation));
            start += size;
        }
        Ok(folds)
    }
}

/// Mean cross-validated score of one parameter combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: Params,
    /// NaN when any fold failed.
    pub mean_score: f64,
}

/// Outcome of [`GridSearch::fit`].
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_params: Params,
    pub best_score: f64,
    /// The base estimator with `best_params` applied, refitted on all rows.
    pub estimator: Estimator,
    pub candidates: Vec<CandidateScore>,
}

/// Grid search over one estimator.
#[derive(Debug, Clone)]
pub struct GridSearch<'a> {
    estimator: &'a Estimator,
    grid: &'a ParamGrid,
    cv: KFold,
}

impl<'a> GridSearch<'a> {
    pub fn new(estimator: &'a Estimator, grid: &'a ParamGrid) -> Self {
        Self {
            estimator,
            grid,
            cv: KFold::default(),
        }
    }

    pub fn with_cv(mut self, cv: KFold) -> Self {
        self.cv = cv;
        self
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<GridSearchResult> {
        let kind = self.estimator.kind();
        let candidates = self.grid.candidates();
        if candidates.is_empty() {
            return Err(MlError::invalid_input(format!(
                "parameter grid for {kind} has no candidates"
            )));
        }
        if x.nrows() < 2 {
            return Err(MlError::invalid_input(format!(
                "grid search needs at least 2 training rows, got {}",
                x.nrows()
            )));
        }
        let cv = KFold::new(self.cv.n_splits.max(2).min(x.nrows()));
        let folds = cv.split(x.nrows())?;

        // Reject unknown names and mistyped values before any fitting.
        for params in &candidates {
            self.estimator.clone().set_params(params)?;
        }

        let scores: Vec<CandidateScore> = candidates
            .into_par_iter()
            .map(|params| {
                let mean_score = match cross_val_score(self.estimator, &params, x, y, &folds) {
                    Ok(score) => score,
                    Err(e) => {
                        warn!(estimator = kind, params = ?params, error = %e, "Candidate failed");
                        f64::NAN
                    }
                };
                debug!(estimator = kind, params = ?params, mean_score, "Scored candidate");
                CandidateScore { params, mean_score }
            })
            .collect();

        let mut best: Option<&CandidateScore> = None;
        for candidate in scores.iter().filter(|c| !c.mean_score.is_nan()) {
            if best.is_none_or(|b| candidate.mean_score > b.mean_score) {
                best = Some(candidate);
            }
        }
        let (best_params, best_score) = best
            .map(|b| (b.params.clone(), b.mean_score))
            .ok_or_else(|| {
                MlError::training(format!("every grid search candidate failed for {kind}"))
            })?;

        let mut estimator = self.estimator.clone();
        estimator.set_params(&best_params)?;
        estimator.fit(x, y)?;

        Ok(GridSearchResult {
            best_params,
            best_score,
            estimator,
            candidates: scores,
        })
    }
}

fn cross_val_score(
    base: &Estimator,
    params: &Params,
    x: &Array2<f64>,
    y: &Array1<f64>,
    folds: &[(Vec<usize>, Vec<usize>)],
) -> Result<f64> {
    let mut total = 0.0;
    for (train, validation) in folds {
        let mut model = base.clone();
        model.set_params(params)?;
        model.fit(&x.select(Axis(0), train), &y.select(Axis(0), train))?;
        let predicted = model.predict(&x.select(Axis(0), validation))?;
        total += r2_score(&y.select(Axis(0), validation), &predicted)?;
    }
    Ok(total / folds.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{DecisionTreeRegressor, KNeighborsRegressor, LinearRegression};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_candidates_last_key_fastest() {
        let grid = ParamGrid::new()
            .with("b", [1, 2])
            .with("a", ["x", "y"]);
        let names: Vec<String> = grid
            .candidates()
            .iter()
            .map(|p| format!("{}{}", p["a"].as_str().unwrap(), p["b"]))
            .collect();
        assert_eq!(names, vec!["x1", "x2", "y1", "y2"]);
        assert_eq!(grid.n_candidates(), 4);
    }

    #[test]
    fn test_empty_grid_has_no_candidates() {
        assert!(ParamGrid::new().candidates().is_empty());
        assert_eq!(ParamGrid::new().n_candidates(), 0);
    }

    #[test]
    fn test_kfold_contiguous_with_larger_first_folds() {
        let folds = KFold::new(3).split(8).unwrap();
        let validation: Vec<Vec<usize>> = folds.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(validation, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7]]);
        assert_eq!(folds[1].0, vec![0, 1, 2, 6, 7]);
    }

    #[test]
    fn test_kfold_rejects_too_few_samples() {
        assert!(KFold::new(3).split(2).is_err());
        assert!(KFold::new(1).split(10).is_err());
    }

    #[test]
    fn test_grid_search_picks_best_k() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| v * 0.5);
        let est = Estimator::KNeighbors(KNeighborsRegressor::default());
        let grid = ParamGrid::new().with("n_neighbors", [1, 15]);
        let result = GridSearch::new(&est, &grid).fit(&x, &y).unwrap();
        assert_eq!(result.best_params["n_neighbors"], json!(1));
        assert_eq!(result.estimator.params()["n_neighbors"], json!(1));
        assert_eq!(result.candidates.len(), 2);
    }

    #[test]
    fn test_failed_candidates_score_nan() {
        // 6 rows, 3 folds: k = 5 exceeds the 4 rows of each training fold.
        let x = Array2::from_shape_fn((6, 1), |(i, _)| i as f64);
        let y = x.column(0).to_owned();
        let est = Estimator::KNeighbors(KNeighborsRegressor::default());
        let grid = ParamGrid::new().with("n_neighbors", [5, 1]);
        let result = GridSearch::new(&est, &grid).fit(&x, &y).unwrap();
        assert!(result.candidates[0].mean_score.is_nan());
        assert_eq!(result.best_params["n_neighbors"], json!(1));
    }

    #[test]
    fn test_all_candidates_failing_is_an_error() {
        let x = Array2::from_shape_fn((6, 1), |(i, _)| i as f64);
        let y = x.column(0).to_owned();
        let est = Estimator::KNeighbors(KNeighborsRegressor::default());
        let grid = ParamGrid::new().with("n_neighbors", [5, 6]);
        let err = GridSearch::new(&est, &grid).fit(&x, &y).unwrap_err();
        assert!(matches!(err, MlError::Training(_)));
    }

    #[test]
    fn test_unknown_grid_key_is_rejected() {
        let x = Array2::from_shape_fn((6, 1), |(i, _)| i as f64);
        let y = x.column(0).to_owned();
        let est = Estimator::LinearRegression(LinearRegression::default());
        let grid = ParamGrid::new().with("alpha", [0.1]);
        let err = GridSearch::new(&est, &grid).fit(&x, &y).unwrap_err();
        assert!(matches!(err, MlError::InvalidParam { .. }));
    }

    #[test]
    fn test_folds_clamped_to_rows() {
        let x = Array2::from_shape_fn((2, 1), |(i, _)| i as f64);
        let y = Array1::from(vec![1.0, 2.0]);
        let est = Estimator::DecisionTree(DecisionTreeRegressor::default());
        let grid = ParamGrid::new().with("criterion", ["squared_error"]);
        let result = GridSearch::new(&est, &grid)
            .with_cv(KFold::new(5))
            .fit(&x, &y)
            .unwrap();
        assert_eq!(result.best_params["criterion"], json!("squared_error"));
    }

    #[test]
    fn test_single_fold_request_raised_to_two() {
        let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
        let y = x.column(0).to_owned();
        let est = Estimator::DecisionTree(DecisionTreeRegressor::default());
        let grid = ParamGrid::new().with("max_depth", [1, 4]);
        let result = GridSearch::new(&est, &grid)
            .with_cv(KFold::new(1))
            .fit(&x, &y)
            .unwrap();
        assert_eq!(result.candidates.len(), 2);
        assert!(result.best_score.is_finite());
    }
}

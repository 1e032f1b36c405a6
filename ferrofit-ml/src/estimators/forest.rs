//! Random forest regressor.

use super::tree::{Criterion, DecisionTreeRegressor};
use super::{
    Params, Regressor, check_fit_input, check_predict_input, param_opt_usize, param_str,
    param_u64, param_usize, unknown_param,
};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Bootstrap-aggregated CART trees; the prediction is the mean over trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub n_estimators: usize,
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub random_state: u64,
    n_features: usize,
    trees: Vec<DecisionTreeRegressor>,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            criterion: Criterion::SquaredError,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            random_state: 42,
            n_features: 0,
            trees: Vec::new(),
        }
    }
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForestRegressor {
    fn kind(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();

        // Per-tree seeds are drawn sequentially before the parallel fit.
        let mut master = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| master.r#gen()).collect();

        let trees: Result<Vec<DecisionTreeRegressor>> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                let mut tree = DecisionTreeRegressor::new()
                    .with_criterion(self.criterion)
                    .with_random_state(rng.r#gen());
                tree.max_depth = self.max_depth;
                tree.min_samples_split = self.min_samples_split;
                tree.min_samples_leaf = self.min_samples_leaf;
                tree.max_features = self.max_features;

                if self.bootstrap {
                    let sample: Vec<usize> =
                        (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                    let x_boot = x.select(Axis(0), &sample);
                    let y_boot = y.select(Axis(0), &sample);
                    tree.fit(&x_boot, &y_boot)?;
                } else {
                    tree.fit(x, y)?;
                }
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(MlError::NotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let mut total = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            total += &tree.predict(x)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let kind = self.kind();
        match name {
            "n_estimators" => self.n_estimators = param_usize(kind, name, value)?,
            "criterion" => self.criterion = param_str(kind, name, value)?.parse()?,
            "max_depth" => self.max_depth = param_opt_usize(kind, name, value)?,
            "min_samples_split" => self.min_samples_split = param_usize(kind, name, value)?,
            "min_samples_leaf" => self.min_samples_leaf = param_usize(kind, name, value)?,
            "max_features" => self.max_features = param_opt_usize(kind, name, value)?,
            "bootstrap" => {
                self.bootstrap = value.as_bool().ok_or_else(|| {
                    MlError::invalid_param(kind, name, format!("expected a boolean, got {value}"))
                })?
            }
            "random_state" => self.random_state = param_u64(kind, name, value)?,
            _ => return Err(unknown_param(kind, name)),
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::from([
            ("n_estimators".to_string(), json!(self.n_estimators)),
            ("criterion".to_string(), json!(self.criterion.as_str())),
            ("max_depth".to_string(), json!(self.max_depth)),
            ("min_samples_split".to_string(), json!(self.min_samples_split)),
            ("min_samples_leaf".to_string(), json!(self.min_samples_leaf)),
            ("max_features".to_string(), json!(self.max_features)),
            ("bootstrap".to_string(), json!(self.bootstrap)),
            ("random_state".to_string(), json!(self.random_state)),
        ])
    }
}

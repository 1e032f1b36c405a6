//! Gradient boosting with squared-error loss.
//!
//! Starts from the target mean; each stage fits a `friedman_mse` tree to the
//! current residuals, optionally on a row subsample drawn without replacement.

use super::tree::{Criterion, DecisionTreeRegressor};
use super::{
    Params, Regressor, check_fit_input, check_predict_input, param_f64, param_learning_rate,
    param_u64, param_usize, unknown_param,
};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Fraction of rows used per stage, in (0, 1].
    pub subsample: f64,
    pub max_depth: usize,
    pub random_state: u64,
    init: Option<f64>,
    n_features: usize,
    stages: Vec<DecisionTreeRegressor>,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            subsample: 1.0,
            max_depth: 3,
            random_state: 42,
            init: None,
            n_features: 0,
            stages: Vec::new(),
        }
    }
}

impl GradientBoostingRegressor {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            ..Self::default()
        }
    }

    pub fn with_subsample(mut self, subsample: f64) -> Self {
        self.subsample = subsample;
        self
    }

    fn subsample_rows(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Option<Vec<usize>> {
        if self.subsample >= 1.0 {
            return None;
        }
        let n_inbag = ((self.subsample * n as f64) as usize).max(1);
        let mut rows: Vec<usize> = (0..n).collect();
        rows.shuffle(rng);
        rows.truncate(n_inbag);
        rows.sort_unstable();
        Some(rows)
    }
}

impl Regressor for GradientBoostingRegressor {
    fn kind(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        let init = y.sum() / n as f64;
        let mut predictions = Array1::from_elem(n, init);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        let mut stages = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            let residuals = y - &predictions;
            let mut tree = DecisionTreeRegressor::new()
                .with_criterion(Criterion::FriedmanMse)
                .with_max_depth(self.max_depth)
                .with_random_state(self.random_state);

            match self.subsample_rows(n, &mut rng) {
                Some(rows) => {
                    let x_sub = x.select(Axis(0), &rows);
                    let r_sub = residuals.select(Axis(0), &rows);
                    tree.fit(&x_sub, &r_sub)?;
                }
                None => tree.fit(x, &residuals)?,
            }

            predictions.scaled_add(self.learning_rate, &tree.predict(x)?);
            stages.push(tree);
        }

        self.init = Some(init);
        self.n_features = x.ncols();
        self.stages = stages;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let init = self.init.ok_or(MlError::NotFitted)?;
        check_predict_input(x, self.n_features)?;

        let mut predictions = Array1::from_elem(x.nrows(), init);
        for tree in &self.stages {
            predictions.scaled_add(self.learning_rate, &tree.predict(x)?);
        }
        Ok(predictions)
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let kind = self.kind();
        match name {
            "n_estimators" => self.n_estimators = param_usize(kind, name, value)?,
            "learning_rate" => self.learning_rate = param_learning_rate(kind, name, value)?,
            "subsample" => {
                let subsample = param_f64(kind, name, value)?;
                if !(subsample > 0.0 && subsample <= 1.0) {
                    return Err(MlError::invalid_param(kind, name, "must be in (0, 1]"));
                }
                self.subsample = subsample;
            }
            "max_depth" => self.max_depth = param_usize(kind, name, value)?,
            "random_state" => self.random_state = param_u64(kind, name, value)?,
            _ => return Err(unknown_param(kind, name)),
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::from([
            ("n_estimators".to_string(), json!(self.n_estimators)),
            ("learning_rate".to_string(), json!(self.learning_rate)),
            ("subsample".to_string(), json!(self.subsample)),
            ("max_depth".to_string(), json!(self.max_depth)),
            ("random_state".to_string(), json!(self.random_state)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::r2_score;

    fn create_regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((100, 2), |(i, j)| (i as f64 / 10.0) + j as f64 * ((i % 3) as f64));
        let y = Array1::from_shape_fn(100, |i| (i as f64 / 10.0).sin() * 3.0 + (i % 3) as f64);
        (x, y)
    }

    #[test]
    fn test_gradient_boosting_regressor() {
        let (x, y) = create_regression_data();
        let mut model = GradientBoostingRegressor::new(100, 0.1);
        model.fit(&x, &y).unwrap();
        let r2 = r2_score(&y, &model.predict(&x).unwrap()).unwrap();
        assert!(r2 > 0.9, "r2 = {r2}");
    }

    #[test]
    fn test_more_stages_reduce_training_error() {
        let (x, y) = create_regression_data();
        let mut short = GradientBoostingRegressor::new(5, 0.1);
        let mut long = GradientBoostingRegressor::new(50, 0.1);
        short.fit(&x, &y).unwrap();
        long.fit(&x, &y).unwrap();
        let r2_short = r2_score(&y, &short.predict(&x).unwrap()).unwrap();
        let r2_long = r2_score(&y, &long.predict(&x).unwrap()).unwrap();
        assert!(r2_long > r2_short);
    }

    #[test]
    fn test_subsample_is_deterministic() {
        let (x, y) = create_regression_data();
        let mut a = GradientBoostingRegressor::new(20, 0.1).with_subsample(0.7);
        let mut b = GradientBoostingRegressor::new(20, 0.1).with_subsample(0.7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_subsample_param_bounds() {
        let mut model = GradientBoostingRegressor::default();
        assert!(model.set_param("subsample", &json!(0.0)).is_err());
        assert!(model.set_param("subsample", &json!(1.5)).is_err());
        model.set_param("subsample", &json!(0.85)).unwrap();
        assert_eq!(model.subsample, 0.85);
    }
}

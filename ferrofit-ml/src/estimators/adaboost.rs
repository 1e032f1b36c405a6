//! AdaBoost.R2 regressor (Drucker, 1997) with linear loss.
//!
//! Each round fits a depth-3 tree on a bootstrap sample drawn with the current
//! sample weights, then reweights samples by their normalized error. The
//! prediction is the weighted median of the estimators' predictions.

use super::tree::DecisionTreeRegressor;
use super::{
    Params, Regressor, check_fit_input, check_predict_input, param_learning_rate, param_u64,
    param_usize, unknown_param,
};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const BASE_MAX_DEPTH: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub random_state: u64,
    n_features: usize,
    estimators: Vec<DecisionTreeRegressor>,
    estimator_weights: Vec<f64>,
}

impl Default for AdaBoostRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            random_state: 42,
            n_features: 0,
            estimators: Vec::new(),
            estimator_weights: Vec::new(),
        }
    }
}

impl AdaBoostRegressor {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            ..Self::default()
        }
    }

    pub fn n_fitted(&self) -> usize {
        self.estimators.len()
    }
}

/// Draw `n` indices with replacement, proportionally to `weights` (which sum to 1).
fn weighted_bootstrap(weights: &[f64], rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut acc = 0.0;
    for w in weights {
        acc += w;
        cumulative.push(acc);
    }
    let last = weights.len() - 1;
    (0..weights.len())
        .map(|_| {
            let u: f64 = rng.r#gen::<f64>() * acc;
            cumulative.partition_point(|&c| c <= u).min(last)
        })
        .collect()
}

impl Regressor for AdaBoostRegressor {
    fn kind(&self) -> &'static str {
        "adaboost"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        let mut sample_weight = vec![1.0 / n as f64; n];
        let mut estimators = Vec::new();
        let mut estimator_weights = Vec::new();

        for round in 0..self.n_estimators {
            let sample = weighted_bootstrap(&sample_weight, &mut rng);
            let mut tree = DecisionTreeRegressor::new()
                .with_max_depth(BASE_MAX_DEPTH)
                .with_random_state(rng.r#gen());
            tree.fit(&x.select(Axis(0), &sample), &y.select(Axis(0), &sample))?;

            let errors: Vec<f64> = tree
                .predict(x)?
                .iter()
                .zip(y.iter())
                .map(|(p, t)| (p - t).abs())
                .collect();
            let error_max = errors.iter().cloned().fold(0.0, f64::max);
            let normalized: Vec<f64> = if error_max > 0.0 {
                errors.iter().map(|e| e / error_max).collect()
            } else {
                errors
            };
            let estimator_error: f64 = sample_weight
                .iter()
                .zip(&normalized)
                .map(|(w, e)| w * e)
                .sum();

            if estimator_error <= 0.0 {
                // Perfect fit: keep it with full weight and stop boosting.
                estimators.push(tree);
                estimator_weights.push(1.0);
                break;
            }
            if estimator_error >= 0.5 {
                // Worse than chance. Only the first estimator is kept.
                if estimators.is_empty() {
                    estimators.push(tree);
                    estimator_weights.push(1.0);
                }
                break;
            }

            let beta = estimator_error / (1.0 - estimator_error);
            estimator_weights.push(self.learning_rate * (1.0 / beta).ln());
            estimators.push(tree);

            if round + 1 < self.n_estimators {
                for (w, e) in sample_weight.iter_mut().zip(&normalized) {
                    *w *= beta.powf((1.0 - e) * self.learning_rate);
                }
                let total: f64 = sample_weight.iter().sum();
                if total <= 0.0 || !total.is_finite() {
                    break;
                }
                for w in &mut sample_weight {
                    *w /= total;
                }
            }
        }

        self.n_features = x.ncols();
        self.estimators = estimators;
        self.estimator_weights = estimator_weights;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.estimators.is_empty() {
            return Err(MlError::NotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let per_estimator: Vec<Array1<f64>> = self
            .estimators
            .iter()
            .map(|e| e.predict(x))
            .collect::<Result<_>>()?;
        let total_weight: f64 = self.estimator_weights.iter().sum();

        let predictions = (0..x.nrows())
            .map(|row| {
                let mut pairs: Vec<(f64, f64)> = per_estimator
                    .iter()
                    .zip(&self.estimator_weights)
                    .map(|(p, &w)| (p[row], w))
                    .collect();
                pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
                let half = 0.5 * total_weight;
                let mut acc = 0.0;
                for &(value, weight) in &pairs {
                    acc += weight;
                    if acc >= half {
                        return value;
                    }
                }
                pairs[pairs.len() - 1].0
            })
            .collect();
        Ok(predictions)
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let kind = self.kind();
        match name {
            "n_estimators" => self.n_estimators = param_usize(kind, name, value)?,
            "learning_rate" => self.learning_rate = param_learning_rate(kind, name, value)?,
            "random_state" => self.random_state = param_u64(kind, name, value)?,
            _ => return Err(unknown_param(kind, name)),
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::from([
            ("n_estimators".to_string(), json!(self.n_estimators)),
            ("learning_rate".to_string(), json!(self.learning_rate)),
            ("random_state".to_string(), json!(self.random_state)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::r2_score;

    fn wave() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((150, 1), |(i, _)| i as f64 / 15.0);
        let y = x.column(0).mapv(|v| (v * 1.3).sin() * 4.0 + v);
        (x, y)
    }

    #[test]
    fn test_adaboost_fits_wave() {
        let (x, y) = wave();
        let mut model = AdaBoostRegressor::new(30, 1.0);
        model.fit(&x, &y).unwrap();
        assert!(model.n_fitted() >= 1);
        let r2 = r2_score(&y, &model.predict(&x).unwrap()).unwrap();
        assert!(r2 > 0.8, "r2 = {r2}");
    }

    #[test]
    fn test_adaboost_is_deterministic() {
        let (x, y) = wave();
        let mut a = AdaBoostRegressor::new(10, 0.5);
        let mut b = AdaBoostRegressor::new(10, 0.5);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_weighted_bootstrap_respects_zero_weights() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let sample = weighted_bootstrap(&[0.0, 1.0, 0.0], &mut rng);
        assert_eq!(sample, vec![1, 1, 1]);
    }

    #[test]
    fn test_perfect_fit_stops_early() {
        let x = Array2::from_shape_fn((8, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(8, 3.0);
        let mut model = AdaBoostRegressor::new(20, 1.0);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_fitted(), 1);
        assert_eq!(model.predict(&x).unwrap(), y);
    }
}

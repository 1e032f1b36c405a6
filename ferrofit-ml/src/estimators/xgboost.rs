//! XGBoost-style gradient boosting with second-order split scoring.
//!
//! - Leaf weight: w* = -G / (H + lambda)
//! - Split gain: 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)], kept only when > gamma
//! - Children must carry at least `min_child_weight` hessian mass
//!
//! With squared-error loss the gradient is `pred - y` and the hessian is 1.

use super::tree::{FlatTree, TreeNode};
use super::{
    Params, Regressor, check_fit_input, check_predict_input, param_f64, param_learning_rate,
    param_usize, unknown_param,
};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const PARALLEL_SPLIT_WORK: usize = 16_384;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    base_score: Option<f64>,
    n_features: usize,
    trees: Vec<FlatTree>,
}

impl Default for XGBRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            base_score: None,
            n_features: 0,
            trees: Vec::new(),
        }
    }
}

impl XGBRegressor {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            ..Self::default()
        }
    }

    fn build_tree(&self, x: &Array2<f64>, grad: &[f64]) -> FlatTree {
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let mut stack = vec![(0usize, (0..x.nrows()).collect::<Vec<usize>>(), 0usize)];

        while let Some((node_idx, indices, depth)) = stack.pop() {
            let g_sum: f64 = indices.iter().map(|&i| grad[i]).sum();
            let h_sum = indices.len() as f64;
            let weight = -g_sum / (h_sum + self.reg_lambda);

            let split = if depth < self.max_depth && indices.len() >= 2 {
                self.best_split(x, grad, &indices, g_sum, h_sum)
                    .filter(|&(_, _, gain)| gain > self.gamma)
            } else {
                None
            };

            match split {
                Some((feature, threshold, _)) => {
                    let (left, right): (Vec<usize>, Vec<usize>) =
                        indices.iter().partition(|&&i| x[[i, feature]] <= threshold);
                    let left_idx = nodes.len();
                    let right_idx = left_idx + 1;
                    nodes.push(TreeNode::Leaf { value: 0.0 });
                    nodes.push(TreeNode::Leaf { value: 0.0 });
                    nodes[node_idx] = TreeNode::Split {
                        feature,
                        threshold,
                        left: left_idx,
                        right: right_idx,
                    };
                    stack.push((right_idx, right, depth + 1));
                    stack.push((left_idx, left, depth + 1));
                }
                None => nodes[node_idx] = TreeNode::Leaf { value: weight },
            }
        }

        FlatTree::from_nodes(nodes)
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        grad: &[f64],
        indices: &[usize],
        g_total: f64,
        h_total: f64,
    ) -> Option<(usize, f64, f64)> {
        let scan = |feature: usize| self.scan_feature(x, grad, indices, feature, g_total, h_total);
        let results: Vec<Option<(usize, f64, f64)>> = if indices.len() * x.ncols() >= PARALLEL_SPLIT_WORK {
            (0..x.ncols()).into_par_iter().map(scan).collect()
        } else {
            (0..x.ncols()).map(scan).collect()
        };

        let mut best: Option<(usize, f64, f64)> = None;
        for candidate in results.into_iter().flatten() {
            if best.is_none_or(|b| candidate.2 > b.2) {
                best = Some(candidate);
            }
        }
        best
    }

    fn scan_feature(
        &self,
        x: &Array2<f64>,
        grad: &[f64],
        indices: &[usize],
        feature: usize,
        g_total: f64,
        h_total: f64,
    ) -> Option<(usize, f64, f64)> {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let lambda = self.reg_lambda;
        let parent = g_total * g_total / (h_total + lambda);
        let mut g_left = 0.0;
        let mut h_left = 0.0;
        let mut best: Option<(usize, f64, f64)> = None;

        for pos in 0..sorted.len() - 1 {
            g_left += grad[sorted[pos]];
            h_left += 1.0;

            let lo = x[[sorted[pos], feature]];
            let hi = x[[sorted[pos + 1], feature]];
            if hi <= lo {
                continue;
            }

            let h_right = h_total - h_left;
            if h_left < self.min_child_weight || h_right < self.min_child_weight {
                continue;
            }
            let g_right = g_total - g_left;
            let gain = 0.5
                * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                    - parent);

            if best.is_none_or(|b| gain > b.2) {
                let mut threshold = (lo + hi) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some((feature, threshold, gain));
            }
        }
        best
    }
}

impl Regressor for XGBRegressor {
    fn kind(&self) -> &'static str {
        "xgboost"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let base = y.sum() / y.len() as f64;
        let mut predictions = Array1::from_elem(x.nrows(), base);
        let mut trees = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            let grad: Vec<f64> = predictions.iter().zip(y.iter()).map(|(p, t)| p - t).collect();
            let tree = self.build_tree(x, &grad);
            predictions.scaled_add(self.learning_rate, &tree.predict(x));
            trees.push(tree);
        }

        self.base_score = Some(base);
        self.n_features = x.ncols();
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let base = self.base_score.ok_or(MlError::NotFitted)?;
        check_predict_input(x, self.n_features)?;

        let mut predictions = Array1::from_elem(x.nrows(), base);
        for tree in &self.trees {
            predictions.scaled_add(self.learning_rate, &tree.predict(x));
        }
        Ok(predictions)
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let kind = self.kind();
        match name {
            "n_estimators" => self.n_estimators = param_usize(kind, name, value)?,
            "learning_rate" => self.learning_rate = param_learning_rate(kind, name, value)?,
            "max_depth" => self.max_depth = param_usize(kind, name, value)?,
            "min_child_weight" => self.min_child_weight = param_f64(kind, name, value)?,
            "reg_lambda" => self.reg_lambda = param_f64(kind, name, value)?,
            "gamma" => self.gamma = param_f64(kind, name, value)?,
            _ => return Err(unknown_param(kind, name)),
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::from([
            ("n_estimators".to_string(), json!(self.n_estimators)),
            ("learning_rate".to_string(), json!(self.learning_rate)),
            ("max_depth".to_string(), json!(self.max_depth)),
            ("min_child_weight".to_string(), json!(self.min_child_weight)),
            ("reg_lambda".to_string(), json!(self.reg_lambda)),
            ("gamma".to_string(), json!(self.gamma)),
        ])
    }
}

//! CatBoost-style boosting with symmetric (oblivious) trees.
//!
//! Features are quantized once into at most `border_count` borders. Every
//! level of a tree applies the same (feature, border) split to all nodes, so
//! a tree of depth d is d splits plus 2^d leaf values.

use super::{
    Params, Regressor, check_fit_input, check_predict_input, param_f64, param_learning_rate,
    param_usize, unknown_param,
};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Symmetric tree: one `(feature, threshold)` per level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ObliviousTree {
    splits: Vec<(usize, f64)>,
    leaf_values: Vec<f64>,
}

impl ObliviousTree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0usize;
        for &(feature, threshold) in &self.splits {
            idx = idx * 2 + usize::from(row[feature] > threshold);
        }
        self.leaf_values[idx]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostRegressor {
    pub iterations: usize,
    pub learning_rate: f64,
    pub depth: usize,
    pub l2_leaf_reg: f64,
    pub border_count: usize,
    base_prediction: Option<f64>,
    n_features: usize,
    trees: Vec<ObliviousTree>,
}

impl Default for CatBoostRegressor {
    fn default() -> Self {
        Self {
            iterations: 1000,
            learning_rate: 0.03,
            depth: 6,
            l2_leaf_reg: 3.0,
            border_count: 64,
            base_prediction: None,
            n_features: 0,
            trees: Vec::new(),
        }
    }
}

/// Per-feature borders and the bin of every sample (bin b means value <= borders[b],
/// bin == borders.len() means above every border).
struct Quantized {
    borders: Vec<Vec<f64>>,
    bins: Vec<Vec<u16>>,
}

impl CatBoostRegressor {
    pub fn new(iterations: usize, learning_rate: f64, depth: usize) -> Self {
        Self {
            iterations,
            learning_rate,
            depth,
            ..Self::default()
        }
    }

    fn quantize(&self, x: &Array2<f64>) -> Quantized {
        let (borders, bins): (Vec<Vec<f64>>, Vec<Vec<u16>>) = x
            .columns()
            .into_iter()
            .map(|column| {
                let mut values: Vec<f64> = column.to_vec();
                values.sort_by(f64::total_cmp);
                values.dedup();

                let midpoints: Vec<f64> = values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
                let borders: Vec<f64> = if midpoints.len() <= self.border_count {
                    midpoints
                } else {
                    let mut picked: Vec<f64> = (1..=self.border_count)
                        .map(|k| midpoints[k * midpoints.len() / (self.border_count + 1)])
                        .collect();
                    picked.dedup();
                    picked
                };

                let bins: Vec<u16> = column
                    .iter()
                    .map(|v| borders.partition_point(|b| b < v) as u16)
                    .collect();
                (borders, bins)
            })
            .unzip();
        Quantized { borders, bins }
    }

    fn build_tree(&self, q: &Quantized, residuals: &[f64]) -> ObliviousTree {
        let n = residuals.len();
        let lambda = self.l2_leaf_reg;
        let mut leaf_of = vec![0usize; n];
        let mut splits = Vec::with_capacity(self.depth);

        for _ in 0..self.depth {
            let n_leaves = 1usize << splits.len();
            let scores: Vec<Option<(usize, f64)>> = (0..q.borders.len())
                .into_par_iter()
                .map(|feature| {
                    let n_borders = q.borders[feature].len();
                    if n_borders == 0 {
                        return None;
                    }
                    // Residual sum and count per (leaf, bin).
                    let stride = n_borders + 1;
                    let mut sums = vec![0.0; n_leaves * stride];
                    let mut counts = vec![0.0; n_leaves * stride];
                    for i in 0..n {
                        let cell = leaf_of[i] * stride + q.bins[feature][i] as usize;
                        sums[cell] += residuals[i];
                        counts[cell] += 1.0;
                    }

                    let mut gains = vec![0.0; n_borders];
                    for leaf in 0..n_leaves {
                        let row = leaf * stride;
                        let total_s: f64 = sums[row..row + stride].iter().sum();
                        let total_c: f64 = counts[row..row + stride].iter().sum();
                        if total_c == 0.0 {
                            continue;
                        }
                        let mut left_s = 0.0;
                        let mut left_c = 0.0;
                        for (border, gain) in gains.iter_mut().enumerate() {
                            left_s += sums[row + border];
                            left_c += counts[row + border];
                            let right_s = total_s - left_s;
                            let right_c = total_c - left_c;
                            *gain += left_s * left_s / (left_c + lambda)
                                + right_s * right_s / (right_c + lambda)
                                - total_s * total_s / (total_c + lambda);
                        }
                    }

                    let mut best: Option<(usize, f64)> = None;
                    for (border, &gain) in gains.iter().enumerate() {
                        if best.is_none_or(|(_, g)| gain > g) {
                            best = Some((border, gain));
                        }
                    }
                    best
                })
                .collect();

            let mut best: Option<(usize, usize, f64)> = None;
            for (feature, score) in scores.into_iter().enumerate() {
                if let Some((border, gain)) = score {
                    if best.is_none_or(|(_, _, g)| gain > g) {
                        best = Some((feature, border, gain));
                    }
                }
            }

            match best {
                Some((feature, border, gain)) if gain > 0.0 => {
                    let bins = &q.bins[feature];
                    for (i, leaf) in leaf_of.iter_mut().enumerate() {
                        *leaf = *leaf * 2 + usize::from(bins[i] as usize > border);
                    }
                    splits.push((feature, q.borders[feature][border]));
                }
                _ => break,
            }
        }

        let n_leaves = 1usize << splits.len();
        let mut sums = vec![0.0; n_leaves];
        let mut counts = vec![0.0; n_leaves];
        for (i, &leaf) in leaf_of.iter().enumerate() {
            sums[leaf] += residuals[i];
            counts[leaf] += 1.0;
        }
        let leaf_values = sums
            .iter()
            .zip(counts.iter())
            .map(|(s, c)| s / (c + lambda))
            .collect();

        ObliviousTree {
            splits,
            leaf_values,
        }
    }
}

impl Regressor for CatBoostRegressor {
    fn kind(&self) -> &'static str {
        "catboost"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        let base = y.sum() / n as f64;
        let quantized = self.quantize(x);
        let mut predictions = vec![base; n];
        let mut trees = Vec::with_capacity(self.iterations);

        for _ in 0..self.iterations {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();
            let tree = self.build_tree(&quantized, &residuals);
            for (i, row) in x.rows().into_iter().enumerate() {
                predictions[i] += self.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        self.base_prediction = Some(base);
        self.n_features = x.ncols();
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let base = self.base_prediction.ok_or(MlError::NotFitted)?;
        check_predict_input(x, self.n_features)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                base + self
                    .trees
                    .iter()
                    .map(|t| self.learning_rate * t.predict_row(row))
                    .sum::<f64>()
            })
            .collect())
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let kind = self.kind();
        match name {
            "iterations" => self.iterations = param_usize(kind, name, value)?,
            "learning_rate" => self.learning_rate = param_learning_rate(kind, name, value)?,
            "depth" => {
                let depth = param_usize(kind, name, value)?;
                if depth > 16 {
                    return Err(MlError::invalid_param(kind, name, "must be <= 16"));
                }
                self.depth = depth;
            }
            "l2_leaf_reg" => self.l2_leaf_reg = param_f64(kind, name, value)?,
            "border_count" => {
                let count = param_usize(kind, name, value)?;
                if count > u16::MAX as usize - 1 {
                    return Err(MlError::invalid_param(kind, name, "too many borders"));
                }
                self.border_count = count;
            }
            _ => return Err(unknown_param(kind, name)),
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::from([
            ("iterations".to_string(), json!(self.iterations)),
            ("learning_rate".to_string(), json!(self.learning_rate)),
            ("depth".to_string(), json!(self.depth)),
            ("l2_leaf_reg".to_string(), json!(self.l2_leaf_reg)),
            ("border_count".to_string(), json!(self.border_count)),
        ])
    }
}

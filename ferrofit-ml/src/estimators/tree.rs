//! CART regression tree.
//!
//! Trees are stored flat (`Vec<TreeNode>` with child indices, root at 0) and
//! grown with an explicit work stack, so neither fitting, prediction nor
//! serialization recurse.

use super::{
    Params, Regressor, check_fit_input, check_predict_input, param_opt_usize, param_str,
    param_u64, param_usize, unknown_param,
};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

/// Two feature values closer than this are treated as equal when splitting.
const FEATURE_THRESHOLD: f64 = 1e-7;

/// A child must hold more than this much target mass for a Poisson split.
const POISSON_EPSILON: f64 = 1e-10;

/// Split positions evaluated per feature for the absolute-error criterion.
const MAX_ABSOLUTE_ERROR_CANDIDATES: usize = 64;

/// Below this many (samples x features) the split search stays on one thread.
const PARALLEL_SPLIT_WORK: usize = 16_384;

/// Node of a flat tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted tree. Samples go left when `x[feature] <= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatTree {
    nodes: Vec<TreeNode>,
}

impl FlatTree {
    pub(crate) fn from_nodes(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.predict_row(row))
            .collect()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let TreeNode::Split { left, right, .. } = &self.nodes[idx] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }
}

/// Split quality criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    SquaredError,
    FriedmanMse,
    AbsoluteError,
    Poisson,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SquaredError => "squared_error",
            Self::FriedmanMse => "friedman_mse",
            Self::AbsoluteError => "absolute_error",
            Self::Poisson => "poisson",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criterion {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "squared_error" => Ok(Self::SquaredError),
            "friedman_mse" => Ok(Self::FriedmanMse),
            "absolute_error" => Ok(Self::AbsoluteError),
            "poisson" => Ok(Self::Poisson),
            other => Err(MlError::invalid_param(
                "decision_tree",
                "criterion",
                format!("unknown criterion '{other}'"),
            )),
        }
    }
}

/// CART decision tree regressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; all features when `None`.
    pub max_features: Option<usize>,
    pub random_state: u64,
    n_features: usize,
    tree: Option<FlatTree>,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self {
            criterion: Criterion::SquaredError,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: 42,
            n_features: 0,
            tree: None,
        }
    }
}

impl DecisionTreeRegressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn tree(&self) -> Option<&FlatTree> {
        self.tree.as_ref()
    }

    /// Depth of the fitted tree, 0 before fitting.
    pub fn get_depth(&self) -> usize {
        self.tree.as_ref().map_or(0, FlatTree::depth)
    }
}

impl Regressor for DecisionTreeRegressor {
    fn kind(&self) -> &'static str {
        "decision_tree"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.criterion == Criterion::Poisson {
            if y.iter().any(|v| *v < 0.0) {
                return Err(MlError::training(
                    "poisson criterion requires non-negative targets",
                ));
            }
            if y.sum() <= 0.0 {
                return Err(MlError::training(
                    "poisson criterion requires a positive target sum",
                ));
            }
        }

        let n_features = x.ncols();
        let builder = TreeBuilder {
            x,
            y,
            criterion: self.criterion,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split.max(2),
            min_samples_leaf: self.min_samples_leaf.max(1),
            max_features: self
                .max_features
                .map_or(n_features, |m| m.clamp(1, n_features)),
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        self.tree = Some(builder.build(&mut rng));
        self.n_features = n_features;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let tree = self.tree.as_ref().ok_or(MlError::NotFitted)?;
        check_predict_input(x, self.n_features)?;
        Ok(tree.predict(x))
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let kind = self.kind();
        match name {
            "criterion" => self.criterion = param_str(kind, name, value)?.parse()?,
            "max_depth" => self.max_depth = param_opt_usize(kind, name, value)?,
            "min_samples_split" => self.min_samples_split = param_usize(kind, name, value)?,
            "min_samples_leaf" => self.min_samples_leaf = param_usize(kind, name, value)?,
            "max_features" => self.max_features = param_opt_usize(kind, name, value)?,
            "random_state" => self.random_state = param_u64(kind, name, value)?,
            _ => return Err(unknown_param(kind, name)),
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::from([
            ("criterion".to_string(), json!(self.criterion.as_str())),
            ("max_depth".to_string(), json!(self.max_depth)),
            ("min_samples_split".to_string(), json!(self.min_samples_split)),
            ("min_samples_leaf".to_string(), json!(self.min_samples_leaf)),
            ("max_features".to_string(), json!(self.max_features)),
            ("random_state".to_string(), json!(self.random_state)),
        ])
    }
}

/// Best split found for one feature.
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    criterion: Criterion,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, rng: &mut Xoshiro256PlusPlus) -> FlatTree {
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let root: Vec<usize> = (0..self.x.nrows()).collect();
        let mut stack = vec![(0usize, root, 0usize)];

        while let Some((node_idx, indices, depth)) = stack.pop() {
            let can_split = indices.len() >= self.min_samples_split
                && indices.len() >= 2 * self.min_samples_leaf
                && self.max_depth.is_none_or(|d| depth < d)
                && !self.is_constant(&indices);

            let split = if can_split {
                self.best_split(&indices, rng)
            } else {
                None
            };

            match split {
                Some(split) => {
                    let (left, right): (Vec<usize>, Vec<usize>) = indices
                        .iter()
                        .partition(|&&i| self.x[[i, split.feature]] <= split.threshold);
                    let left_idx = nodes.len();
                    let right_idx = left_idx + 1;
                    nodes.push(TreeNode::Leaf { value: 0.0 });
                    nodes.push(TreeNode::Leaf { value: 0.0 });
                    nodes[node_idx] = TreeNode::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: left_idx,
                        right: right_idx,
                    };
                    stack.push((right_idx, right, depth + 1));
                    stack.push((left_idx, left, depth + 1));
                }
                None => {
                    nodes[node_idx] = TreeNode::Leaf {
                        value: self.leaf_value(&indices),
                    };
                }
            }
        }

        FlatTree::from_nodes(nodes)
    }

    fn is_constant(&self, indices: &[usize]) -> bool {
        let first = self.y[indices[0]];
        indices.iter().all(|&i| (self.y[i] - first).abs() <= 1e-12)
    }

    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let values: Vec<f64> = indices.iter().map(|&i| self.y[i]).collect();
        match self.criterion {
            Criterion::AbsoluteError => median(values),
            _ => values.iter().sum::<f64>() / values.len() as f64,
        }
    }

    fn best_split(&self, indices: &[usize], rng: &mut Xoshiro256PlusPlus) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let features: Vec<usize> = if self.max_features < n_features {
            let mut drawn = rand::seq::index::sample(rng, n_features, self.max_features).into_vec();
            drawn.sort_unstable();
            drawn
        } else {
            (0..n_features).collect()
        };

        let results: Vec<Option<SplitCandidate>> =
            if indices.len() * features.len() >= PARALLEL_SPLIT_WORK {
                features
                    .par_iter()
                    .map(|&f| self.scan_feature(indices, f))
                    .collect()
            } else {
                features
                    .iter()
                    .map(|&f| self.scan_feature(indices, f))
                    .collect()
            };

        // First maximal candidate wins, so ties resolve to the lowest feature.
        let mut best: Option<SplitCandidate> = None;
        for candidate in results.into_iter().flatten() {
            if best.is_none_or(|b| candidate.gain > b.gain) {
                best = Some(candidate);
            }
        }
        best
    }

    fn scan_feature(&self, indices: &[usize], feature: usize) -> Option<SplitCandidate> {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

        let first = self.x[[order[0], feature]];
        let last = self.x[[order[order.len() - 1], feature]];
        if last <= first + FEATURE_THRESHOLD {
            return None;
        }

        let n = order.len();
        let valid_positions: Vec<usize> = (self.min_samples_leaf - 1..n - self.min_samples_leaf)
            .filter(|&pos| {
                self.x[[order[pos + 1], feature]] > self.x[[order[pos], feature]] + FEATURE_THRESHOLD
            })
            .collect();
        if valid_positions.is_empty() {
            return None;
        }

        let (pos, gain) = match self.criterion {
            Criterion::AbsoluteError => self.scan_absolute_error(&order, &valid_positions)?,
            _ => self.scan_prefix(&order, &valid_positions)?,
        };

        let lo = self.x[[order[pos], feature]];
        let hi = self.x[[order[pos + 1], feature]];
        let mut threshold = (lo + hi) / 2.0;
        if threshold >= hi {
            threshold = lo;
        }

        Some(SplitCandidate {
            feature,
            threshold,
            gain,
        })
    }

    /// Squared-error, Friedman and Poisson gains from running sums.
    fn scan_prefix(&self, order: &[usize], valid_positions: &[usize]) -> Option<(usize, f64)> {
        let n = order.len() as f64;
        let ys: Vec<f64> = order.iter().map(|&i| self.y[i]).collect();
        let total_sum: f64 = ys.iter().sum();
        let total_sq: f64 = ys.iter().map(|v| v * v).sum();
        let total_xlogy: f64 = ys.iter().map(|&v| xlogy(v)).sum();

        let sse = |s: f64, q: f64, c: f64| q - s * s / c;
        let deviance = |s: f64, l: f64, c: f64| l - s * (s / c).ln();

        let parent = match self.criterion {
            Criterion::SquaredError => sse(total_sum, total_sq, n),
            Criterion::Poisson => deviance(total_sum, total_xlogy, n),
            _ => 0.0,
        };

        let mut best: Option<(usize, f64)> = None;
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let mut left_xlogy = 0.0;
        let mut next = 0usize;

        for &pos in valid_positions {
            while next <= pos {
                let v = ys[next];
                left_sum += v;
                left_sq += v * v;
                left_xlogy += xlogy(v);
                next += 1;
            }
            let nl = (pos + 1) as f64;
            let nr = n - nl;
            let right_sum = total_sum - left_sum;

            let gain = match self.criterion {
                Criterion::SquaredError => {
                    parent - sse(left_sum, left_sq, nl) - sse(right_sum, total_sq - left_sq, nr)
                }
                Criterion::FriedmanMse => {
                    let diff = left_sum / nl - right_sum / nr;
                    nl * nr / n * diff * diff
                }
                Criterion::Poisson => {
                    if left_sum <= POISSON_EPSILON || right_sum <= POISSON_EPSILON {
                        continue;
                    }
                    parent
                        - deviance(left_sum, left_xlogy, nl)
                        - deviance(right_sum, total_xlogy - left_xlogy, nr)
                }
                Criterion::AbsoluteError => unreachable!("handled by scan_absolute_error"),
            };

            if best.is_none_or(|(_, g)| gain > g) {
                best = Some((pos, gain));
            }
        }
        best
    }

    /// Absolute-error gain on an evenly spaced subset of split positions.
    fn scan_absolute_error(&self, order: &[usize], valid_positions: &[usize]) -> Option<(usize, f64)> {
        let ys: Vec<f64> = order.iter().map(|&i| self.y[i]).collect();
        let parent = absolute_deviation(&ys);

        let candidates: Vec<usize> = if valid_positions.len() > MAX_ABSOLUTE_ERROR_CANDIDATES {
            (0..MAX_ABSOLUTE_ERROR_CANDIDATES)
                .map(|k| valid_positions[k * valid_positions.len() / MAX_ABSOLUTE_ERROR_CANDIDATES])
                .collect()
        } else {
            valid_positions.to_vec()
        };

        let mut best: Option<(usize, f64)> = None;
        for pos in candidates {
            let cost = absolute_deviation(&ys[..=pos]) + absolute_deviation(&ys[pos + 1..]);
            let gain = parent - cost;
            if best.is_none_or(|(_, g)| gain > g) {
                best = Some((pos, gain));
            }
        }
        best
    }
}

fn xlogy(v: f64) -> f64 {
    if v > 0.0 { v * v.ln() } else { 0.0 }
}

pub(crate) fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn absolute_deviation(values: &[f64]) -> f64 {
    let m = median(values.to_vec());
    values.iter().map(|v| (v - m).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];
        (x, y)
    }

    #[test]
    fn test_fits_step_function_exactly() {
        let (x, y) = step_data();
        for criterion in [
            Criterion::SquaredError,
            Criterion::FriedmanMse,
            Criterion::AbsoluteError,
            Criterion::Poisson,
        ] {
            let mut tree = DecisionTreeRegressor::new().with_criterion(criterion);
            tree.fit(&x, &y).unwrap();
            let pred = tree.predict(&x).unwrap();
            assert_eq!(pred, y, "criterion {criterion}");
            assert_eq!(tree.get_depth(), 1, "criterion {criterion}");
            assert_eq!(tree.tree().unwrap().n_leaves(), 2);
        }
    }

    #[test]
    fn test_threshold_is_midpoint() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();
        let pred = tree.predict(&array![[3.4], [3.6]]).unwrap();
        assert_eq!(pred, array![1.0, 5.0]);
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| v * v);
        let mut tree = DecisionTreeRegressor::new().with_max_depth(2);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.get_depth(), 2);
        assert_eq!(tree.tree().unwrap().n_leaves(), 4);
    }

    #[test]
    fn test_unbounded_tree_memorizes_training_data() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f64 + i as f64 * 0.01);
        let y = Array1::from_shape_fn(40, |i| (i as f64).sin());
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();
        let pred = tree.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_absolute_error_uses_median_leaves() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = array![1.0, 2.0, 10.0];
        let mut tree = DecisionTreeRegressor::new().with_criterion(Criterion::AbsoluteError);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&array![[1.0]]).unwrap()[0], 2.0);
    }

    #[test]
    fn test_poisson_rejects_negative_targets() {
        let x = array![[1.0], [2.0]];
        let y = array![-1.0, 2.0];
        let mut tree = DecisionTreeRegressor::new().with_criterion(Criterion::Poisson);
        assert!(matches!(tree.fit(&x, &y), Err(MlError::Training(_))));
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTreeRegressor::new();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(MlError::NotFitted)));
    }

    #[test]
    fn test_predict_feature_mismatch() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();
        assert!(matches!(
            tree.predict(&array![[1.0, 2.0]]),
            Err(MlError::Shape { .. })
        ));
    }

    #[test]
    fn test_criterion_param_parsing() {
        let mut tree = DecisionTreeRegressor::new();
        tree.set_param("criterion", &json!("friedman_mse")).unwrap();
        assert_eq!(tree.criterion, Criterion::FriedmanMse);
        assert!(tree.set_param("criterion", &json!("gini")).is_err());
    }

    #[test]
    fn test_deep_tree_serializes() {
        // A staircase target forces a deep, unbalanced tree.
        let n = 300;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| 2f64.powi((i % 60) as i32));
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();

        let text = serde_json::to_string(&tree).unwrap();
        let back: DecisionTreeRegressor = serde_json::from_str(&text).unwrap();
        assert_eq!(back.predict(&x).unwrap(), tree.predict(&x).unwrap());
    }
}

//! The fixed set of candidate regression algorithms and their search grids.

use crate::estimators::{
    AdaBoostRegressor, CatBoostRegressor, DecisionTreeRegressor, Estimator,
    GradientBoostingRegressor, KNeighborsRegressor, LinearRegression, RandomForestRegressor,
    XGBRegressor,
};
use crate::search::ParamGrid;
use serde::Serialize;
use std::collections::BTreeMap;

pub const RANDOM_FOREST: &str = "Random Forest";
pub const DECISION_TREE: &str = "Decision Tree";
pub const GRADIENT_BOOSTING: &str = "Gradient Boosting";
pub const LINEAR_REGRESSION: &str = "Linear Regression";
pub const K_NEIGHBORS: &str = "k-Neighbors Regressor";
pub const XGBOOST: &str = "XGBRegressor";
pub const CATBOOST: &str = "CatBoosting Regressor";
pub const ADABOOST: &str = "AdaBoost Regressor";

/// Search grid per catalog name. A missing name means "fit with defaults".
pub type ParamGrids = BTreeMap<String, ParamGrid>;

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub estimator: Estimator,
}

/// Ordered catalog of named, unfitted estimators.
///
/// Order matters: when two entries score the same, the earlier one wins.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn with(mut self, name: impl Into<String>, estimator: Estimator) -> Self {
        self.entries.push(CatalogEntry {
            name: name.into(),
            estimator,
        });
        self
    }

    /// The eight standard regressors, seeded with `random_state`.
    pub fn default_catalog(random_state: u64) -> Self {
        let tree = DecisionTreeRegressor::new().with_random_state(random_state);
        let mut boosting = GradientBoostingRegressor::default();
        boosting.random_state = random_state;
        let mut adaboost = AdaBoostRegressor::default();
        adaboost.random_state = random_state;

        Self::new()
            .with(
                RANDOM_FOREST,
                Estimator::RandomForest(RandomForestRegressor::default().with_random_state(random_state)),
            )
            .with(DECISION_TREE, Estimator::DecisionTree(tree))
            .with(GRADIENT_BOOSTING, Estimator::GradientBoosting(boosting))
            .with(LINEAR_REGRESSION, Estimator::LinearRegression(LinearRegression::new()))
            .with(K_NEIGHBORS, Estimator::KNeighbors(KNeighborsRegressor::default()))
            .with(XGBOOST, Estimator::XGBoost(XGBRegressor::default()))
            .with(CATBOOST, Estimator::CatBoost(CatBoostRegressor::default()))
            .with(ADABOOST, Estimator::AdaBoost(adaboost))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const LEARNING_RATES: [f64; 4] = [0.1, 0.01, 0.05, 0.001];
const N_ESTIMATORS: [u64; 6] = [8, 16, 32, 64, 128, 256];

/// Hyperparameter grids searched for the default catalog.
pub fn default_param_grids() -> ParamGrids {
    ParamGrids::from([
        (
            RANDOM_FOREST.to_string(),
            ParamGrid::new().with("n_estimators", N_ESTIMATORS),
        ),
        (
            DECISION_TREE.to_string(),
            ParamGrid::new().with(
                "criterion",
                ["squared_error", "friedman_mse", "absolute_error", "poisson"],
            ),
        ),
        (
            GRADIENT_BOOSTING.to_string(),
            ParamGrid::new()
                .with("learning_rate", LEARNING_RATES)
                .with("subsample", [0.6, 0.7, 0.75, 0.8, 0.85, 0.9])
                .with("n_estimators", N_ESTIMATORS),
        ),
        (LINEAR_REGRESSION.to_string(), ParamGrid::new()),
        (
            K_NEIGHBORS.to_string(),
            ParamGrid::new().with("n_neighbors", [5, 7, 9, 11]),
        ),
        (
            XGBOOST.to_string(),
            ParamGrid::new()
                .with("learning_rate", LEARNING_RATES)
                .with("n_estimators", N_ESTIMATORS),
        ),
        (
            CATBOOST.to_string(),
            ParamGrid::new()
                .with("depth", [6, 8, 10])
                .with("learning_rate", [0.01, 0.05, 0.1])
                .with("iterations", [30, 50, 100]),
        ),
        (
            ADABOOST.to_string(),
            ParamGrid::new()
                .with("learning_rate", LEARNING_RATES)
                .with("n_estimators", N_ESTIMATORS),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::Regressor;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_default_catalog_order() {
        let catalog = ModelCatalog::default_catalog(42);
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(
            names,
            vec![
                "Random Forest",
                "Decision Tree",
                "Gradient Boosting",
                "Linear Regression",
                "k-Neighbors Regressor",
                "XGBRegressor",
                "CatBoosting Regressor",
                "AdaBoost Regressor",
            ]
        );
    }

    #[test]
    fn test_every_entry_has_a_grid_its_estimator_accepts() {
        let catalog = ModelCatalog::default_catalog(42);
        let grids = default_param_grids();
        assert_eq!(grids.len(), catalog.len());
        for entry in catalog.entries() {
            let grid = &grids[&entry.name];
            for params in grid.candidates() {
                let mut est = entry.estimator.clone();
                est.set_params(&params).unwrap();
            }
        }
    }

    #[test]
    fn test_grid_sizes() {
        let grids = default_param_grids();
        assert_eq!(grids[GRADIENT_BOOSTING].n_candidates(), 4 * 6 * 6);
        assert_eq!(grids[CATBOOST].n_candidates(), 27);
        assert!(grids[LINEAR_REGRESSION].is_empty());
    }

    #[test]
    fn test_random_state_is_applied() {
        let catalog = ModelCatalog::default_catalog(7);
        let forest = &catalog.entries()[0].estimator;
        assert_eq!(forest.params()["random_state"], json!(7));
        let adaboost = &catalog.entries()[7].estimator;
        assert_eq!(adaboost.params()["random_state"], json!(7));
    }
}

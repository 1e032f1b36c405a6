//! Native regression estimators.
//!
//! Every estimator implements [`Regressor`]. [`Estimator`] wraps the concrete
//! types in one serde-tagged enum, so a fitted model can be cloned for grid
//! search and written to an artifact without trait objects.

pub mod adaboost;
pub mod catboost;
pub mod forest;
pub mod gradient_boosting;
pub mod knn;
pub mod linear;
pub mod tree;
pub mod xgboost;

pub use adaboost::AdaBoostRegressor;
pub use catboost::CatBoostRegressor;
pub use forest::RandomForestRegressor;
pub use gradient_boosting::GradientBoostingRegressor;
pub use knn::KNeighborsRegressor;
pub use linear::LinearRegression;
pub use tree::{Criterion, DecisionTreeRegressor};
pub use xgboost::XGBRegressor;

use crate::error::{MlError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Hyperparameter name to value, in a stable order.
pub type Params = BTreeMap<String, Value>;

/// A regression estimator.
pub trait Regressor {
    /// Short identifier used in error messages.
    fn kind(&self) -> &'static str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Set one hyperparameter by name.
    fn set_param(&mut self, name: &str, value: &Value) -> Result<()>;

    /// Current hyperparameters.
    fn params(&self) -> Params;

    /// Set several hyperparameters, stopping at the first invalid one.
    fn set_params(&mut self, params: &Params) -> Result<()> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }
}

/// Any of the catalog estimators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    RandomForest(RandomForestRegressor),
    DecisionTree(DecisionTreeRegressor),
    GradientBoosting(GradientBoostingRegressor),
    LinearRegression(LinearRegression),
    KNeighbors(KNeighborsRegressor),
    XGBoost(XGBRegressor),
    CatBoost(CatBoostRegressor),
    AdaBoost(AdaBoostRegressor),
}

impl Estimator {
    fn inner(&self) -> &dyn Regressor {
        match self {
            Self::RandomForest(m) => m,
            Self::DecisionTree(m) => m,
            Self::GradientBoosting(m) => m,
            Self::LinearRegression(m) => m,
            Self::KNeighbors(m) => m,
            Self::XGBoost(m) => m,
            Self::CatBoost(m) => m,
            Self::AdaBoost(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Regressor {
        match self {
            Self::RandomForest(m) => m,
            Self::DecisionTree(m) => m,
            Self::GradientBoosting(m) => m,
            Self::LinearRegression(m) => m,
            Self::KNeighbors(m) => m,
            Self::XGBoost(m) => m,
            Self::CatBoost(m) => m,
            Self::AdaBoost(m) => m,
        }
    }
}

impl Regressor for Estimator {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        self.inner_mut().set_param(name, value)
    }

    fn params(&self) -> Params {
        self.inner().params()
    }
}

/// Validate a training pair before fitting.
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(MlError::shape(
            format!("y length = {}", x.nrows()),
            format!("y length = {}", y.len()),
        ));
    }
    if x.nrows() == 0 {
        return Err(MlError::training("cannot fit on an empty dataset"));
    }
    if x.ncols() == 0 {
        return Err(MlError::training("cannot fit without features"));
    }
    Ok(())
}

/// Validate the feature count of a prediction input.
pub(crate) fn check_predict_input(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(MlError::shape(
            format!("{n_features} features"),
            format!("{} features", x.ncols()),
        ));
    }
    Ok(())
}

pub(crate) fn param_usize(kind: &str, name: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .filter(|v| *v > 0)
        .map(|v| v as usize)
        .ok_or_else(|| MlError::invalid_param(kind, name, format!("expected a positive integer, got {value}")))
}

pub(crate) fn param_opt_usize(kind: &str, name: &str, value: &Value) -> Result<Option<usize>> {
    if value.is_null() {
        return Ok(None);
    }
    param_usize(kind, name, value).map(Some)
}

pub(crate) fn param_f64(kind: &str, name: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MlError::invalid_param(kind, name, format!("expected a number, got {value}")))
}

pub(crate) fn param_u64(kind: &str, name: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| MlError::invalid_param(kind, name, format!("expected an unsigned integer, got {value}")))
}

pub(crate) fn param_str<'a>(kind: &str, name: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| MlError::invalid_param(kind, name, format!("expected a string, got {value}")))
}

pub(crate) fn unknown_param(kind: &str, name: &str) -> MlError {
    MlError::invalid_param(kind, name, "unknown parameter")
}

/// Positive learning rate check shared by the boosting estimators.
pub(crate) fn param_learning_rate(kind: &str, name: &str, value: &Value) -> Result<f64> {
    let rate = param_f64(kind, name, value)?;
    if rate <= 0.0 {
        return Err(MlError::invalid_param(kind, name, "must be > 0"));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn test_estimator_dispatch_and_params() {
        let mut est = Estimator::KNeighbors(KNeighborsRegressor::default());
        assert_eq!(est.kind(), "k_neighbors");
        est.set_param("n_neighbors", &json!(2)).unwrap();
        assert_eq!(est.params()["n_neighbors"], json!(2));

        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 2.0, 3.0];
        est.fit(&x, &y).unwrap();
        let pred = est.predict(&array![[0.2]]).unwrap();
        assert!((pred[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_param_rejected() {
        let mut est = Estimator::LinearRegression(LinearRegression::default());
        let err = est.set_param("alpha", &json!(1.0)).unwrap_err();
        assert!(matches!(err, MlError::InvalidParam { .. }));
    }

    #[test]
    fn test_wrong_param_type_rejected() {
        let mut est = Estimator::RandomForest(RandomForestRegressor::default());
        assert!(est.set_param("n_estimators", &json!("many")).is_err());
        assert!(est.set_param("n_estimators", &json!(0)).is_err());
    }

    #[test]
    fn test_serde_tag_roundtrip() {
        let est = Estimator::DecisionTree(DecisionTreeRegressor::default());
        let text = serde_json::to_string(&est).unwrap();
        assert!(text.contains("\"kind\":\"decision_tree\""));
        let back: Estimator = serde_json::from_str(&text).unwrap();
        assert_eq!(back.kind(), "decision_tree");
    }
}

//! K-nearest neighbors regressor.

use super::{Params, Regressor, check_fit_input, check_predict_input, param_usize, unknown_param};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Brute-force Euclidean KNN with uniform weights.
///
/// Neighbors at equal distance are taken in training order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNeighborsRegressor {
    pub n_neighbors: usize,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl Default for KNeighborsRegressor {
    fn default() -> Self {
        Self::with_k(5)
    }
}

impl KNeighborsRegressor {
    pub fn with_k(k: usize) -> Self {
        Self {
            n_neighbors: k,
            x_train: None,
            y_train: None,
        }
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>, x_train: &Array2<f64>, y_train: &Array1<f64>) -> f64 {
        let mut distances: Vec<(f64, usize)> = x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train_row)| {
                let d: f64 = train_row
                    .iter()
                    .zip(row.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (d, i)
            })
            .collect();

        let k = self.n_neighbors;
        let by_distance = |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < distances.len() {
            distances.select_nth_unstable_by(k - 1, by_distance);
            distances.truncate(k);
        }
        distances.iter().map(|&(_, i)| y_train[i]).sum::<f64>() / k as f64
    }
}

impl Regressor for KNeighborsRegressor {
    fn kind(&self) -> &'static str {
        "k_neighbors"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (Some(x_train), Some(y_train)) = (&self.x_train, &self.y_train) else {
            return Err(MlError::NotFitted);
        };
        check_predict_input(x, x_train.ncols())?;
        if self.n_neighbors > x_train.nrows() {
            return Err(MlError::invalid_input(format!(
                "n_neighbors = {} exceeds the {} fitted samples",
                self.n_neighbors,
                x_train.nrows()
            )));
        }

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict_row(x.row(i), x_train, y_train))
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "n_neighbors" => self.n_neighbors = param_usize(self.kind(), name, value)?,
            _ => return Err(unknown_param(self.kind(), name)),
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::from([("n_neighbors".to_string(), json!(self.n_neighbors))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_of_nearest() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0]];
        let y = array![0.0, 1.0, 2.0, 10.0, 11.0];
        let mut knn = KNeighborsRegressor::with_k(3);
        knn.fit(&x, &y).unwrap();
        let pred = knn.predict(&array![[1.1], [10.6]]).unwrap();
        assert!((pred[0] - 1.0).abs() < 1e-12);
        assert!((pred[1] - 23.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_use_training_order() {
        let x = array![[1.0], [-1.0], [1.0]];
        let y = array![10.0, 20.0, 30.0];
        let mut knn = KNeighborsRegressor::with_k(1);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.0]]).unwrap()[0], 10.0);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut knn = KNeighborsRegressor::default();
        knn.fit(&x, &y).unwrap();
        assert!(matches!(knn.predict(&x), Err(MlError::InvalidInput(_))));
    }
}

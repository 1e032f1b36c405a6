//! Ordinary least squares.

use super::{Params, Regressor, check_fit_input, check_predict_input, unknown_param};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relative pivot size below which a column is treated as linearly dependent.
const RANK_TOLERANCE: f64 = 1e-10;

/// Linear regression with an intercept.
///
/// Solves the normal equations on centered data. Columns that are constant
/// or linearly dependent on earlier columns get a zero coefficient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegression {
    fn kind(&self) -> &'static str {
        "linear_regression"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| MlError::training("cannot center an empty matrix"))?;
        let y_mean = y.sum() / y.len() as f64;

        let xc = x - &x_mean;
        let yc = y - y_mean;
        let gram = xc.t().dot(&xc);
        let rhs = xc.t().dot(&yc);

        let coefficients = solve_symmetric(gram, rhs);
        self.intercept = y_mean - x_mean.dot(&coefficients);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(MlError::NotFitted)?;
        check_predict_input(x, coefficients.len())?;
        Ok(x.dot(coefficients) + self.intercept)
    }

    fn set_param(&mut self, name: &str, _value: &Value) -> Result<()> {
        Err(unknown_param(self.kind(), name))
    }

    fn params(&self) -> Params {
        Params::new()
    }
}

/// Solve `a * x = b` for symmetric positive semi-definite `a` by Gaussian
/// elimination with partial pivoting. Dependent columns are dropped (x = 0).
fn solve_symmetric(mut a: Array2<f64>, mut b: Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let scale = a.diag().iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let tolerance = RANK_TOLERANCE * scale.max(f64::MIN_POSITIVE);

    let mut pivot_row_of_col: Vec<Option<usize>> = vec![None; n];
    let mut used = vec![false; n];

    for col in 0..n {
        let pivot = (0..n)
            .filter(|&r| !used[r])
            .max_by(|&r1, &r2| a[[r1, col]].abs().total_cmp(&a[[r2, col]].abs()));
        let Some(pivot) = pivot else { continue };
        if a[[pivot, col]].abs() <= tolerance {
            continue;
        }
        used[pivot] = true;
        pivot_row_of_col[col] = Some(pivot);

        for r in 0..n {
            if r == pivot {
                continue;
            }
            let factor = a[[r, col]] / a[[pivot, col]];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[[r, c]] -= factor * a[[pivot, c]];
            }
            b[r] -= factor * b[pivot];
        }
    }

    let mut x = Array1::zeros(n);
    for col in 0..n {
        if let Some(row) = pivot_row_of_col[col] {
            x[col] = b[row] / a[[row, col]];
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_exact_line() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        assert!((model.coefficients().unwrap()[0] - 2.0).abs() < 1e-12);
        assert!(model.intercept().abs() < 1e-12);
        let pred = model.predict(&array![[10.0]]).unwrap();
        assert!((pred[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_multivariate_with_intercept() {
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 3.0], [3.0, 1.0]];
        let y = x.column(0).mapv(|v| 3.0 * v) + &x.column(1).mapv(|v| -1.5 * v) + 4.0;
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let coef = model.coefficients().unwrap();
        assert!((coef[0] - 3.0).abs() < 1e-9);
        assert!((coef[1] + 1.5).abs() < 1e-9);
        assert!((model.intercept() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_column_is_dropped() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-9);
        }
        assert!(model.coefficients().unwrap().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_constant_feature() {
        let x = array![[5.0], [5.0], [5.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.coefficients().unwrap()[0], 0.0);
        assert!((model.intercept() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_has_no_tunable_params() {
        let mut model = LinearRegression::new();
        assert!(model.params().is_empty());
        assert!(model.set_param("fit_intercept", &serde_json::json!(false)).is_err());
    }
}

//! Dataset loading and feature/target splitting.

use crate::error::{MlError, Result};
use csv::ReaderBuilder;
use ndarray::{Array1, Array2, ArrayView2, s};
use std::path::Path;

/// Split a matrix whose last column is the target into `(features, target)`.
///
/// The matrix must have at least one row, at least two columns, and only
/// finite values.
pub fn split_features_target(matrix: ArrayView2<'_, f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let (rows, cols) = matrix.dim();
    if rows == 0 {
        return Err(MlError::invalid_input("matrix has no rows"));
    }
    if cols < 2 {
        return Err(MlError::shape(
            "at least 2 columns (features + target)",
            format!("{cols} column(s)"),
        ));
    }
    ensure_finite(matrix)?;

    let features = matrix.slice(s![.., ..cols - 1]).to_owned();
    let target = matrix.column(cols - 1).to_owned();
    Ok((features, target))
}

/// Reject matrices containing NaN or infinite values.
pub fn ensure_finite(matrix: ArrayView2<'_, f64>) -> Result<()> {
    if let Some(((row, col), value)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(MlError::invalid_input(format!(
            "non-finite value {value} at row {row}, column {col}"
        )));
    }
    Ok(())
}

/// Load a numeric CSV file into a dense matrix.
pub fn load_csv_matrix(path: &Path, has_headers: bool) -> Result<Array2<f64>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut values = Vec::new();
    let mut n_cols = None;
    let mut n_rows = 0usize;

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        match n_cols {
            None => n_cols = Some(record.len()),
            Some(expected) if expected != record.len() => {
                return Err(MlError::dataset(format!(
                    "row {} has {} columns, expected {}",
                    row_idx + 1,
                    record.len(),
                    expected
                )));
            }
            Some(_) => {}
        }
        for (col_idx, field) in record.iter().enumerate() {
            let value: f64 = field.parse().map_err(|_| {
                MlError::dataset(format!(
                    "value '{}' at row {}, column {} is not numeric",
                    field,
                    row_idx + 1,
                    col_idx + 1
                ))
            })?;
            values.push(value);
        }
        n_rows += 1;
    }

    let n_cols = n_cols.ok_or_else(|| MlError::dataset(format!("{} has no data rows", path.display())))?;
    Array2::from_shape_vec((n_rows, n_cols), values)
        .map_err(|e| MlError::dataset(format!("cannot build matrix: {e}")))
}

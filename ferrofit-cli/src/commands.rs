//! Subcommand handlers.

use anyhow::Context;
use ferrofit_ml::data::load_csv_matrix;
use ferrofit_ml::{
    ModelCatalog, ModelReport, ModelTrainer, PredictPipeline, TrainerConfig, default_param_grids,
};
use std::fmt::Write as _;
use std::path::Path;

pub fn train(config: &TrainerConfig, train: &Path, test: &Path, has_headers: bool) -> anyhow::Result<()> {
    let train_array = load_csv_matrix(train, has_headers)
        .with_context(|| format!("Failed to load training data from {}", train.display()))?;
    let test_array = load_csv_matrix(test, has_headers)
        .with_context(|| format!("Failed to load test data from {}", test.display()))?;

    let trainer = ModelTrainer::new(config.clone());
    let outcome = trainer.train(train_array.view(), test_array.view())?;

    print!("{}", render_report(&outcome.report));
    println!(
        "\nBest model: {} (test R² = {:.4})",
        outcome.best_model, outcome.best_score
    );
    println!("Saved to {}", outcome.artifact_path.display());
    Ok(())
}

pub fn predict(model: &Path, input: &Path, has_headers: bool) -> anyhow::Result<()> {
    let pipeline = PredictPipeline::load(model)?;
    let features = load_csv_matrix(input, has_headers)
        .with_context(|| format!("Failed to load features from {}", input.display()))?;
    for value in pipeline.predict(&features)? {
        println!("{value}");
    }
    Ok(())
}

pub fn catalog(config: &TrainerConfig) -> anyhow::Result<()> {
    let catalog = ModelCatalog::default_catalog(config.random_state);
    let grids = default_param_grids();
    let listing: Vec<serde_json::Value> = catalog
        .names()
        .map(|name| {
            serde_json::json!({
                "name": name,
                "grid": grids.get(name),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

/// Fixed-width table of train/test scores in catalog order.
fn render_report(report: &ModelReport) -> String {
    let width = report
        .scores()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("model".len());
    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:>9}  {:>9}", "model", "train R²", "test R²");
    for score in report.scores() {
        let _ = writeln!(
            out,
            "{:<width$}  {:>9.4}  {:>9.4}",
            score.name, score.train_score, score.test_score
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrofit_ml::estimators::LinearRegression;
    use ferrofit_ml::{Estimator, EvaluationOptions, ParamGrids, evaluate_models};
    use ndarray::{Array1, Array2};

    #[test]
    fn test_render_report_lists_models_in_order() {
        let x = Array2::from_shape_fn((6, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(6, |i| 3.0 * i as f64);
        let catalog = ModelCatalog::new()
            .with("Linear Regression", Estimator::LinearRegression(LinearRegression::new()))
            .with("Again", Estimator::LinearRegression(LinearRegression::new()));
        let report = evaluate_models(
            &x,
            &y,
            &x,
            &y,
            &catalog,
            &ParamGrids::new(),
            EvaluationOptions::default(),
        )
        .unwrap();

        let table = render_report(&report);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("model"));
        assert!(lines[1].starts_with("Linear Regression"));
        assert!(lines[1].ends_with("1.0000"));
        assert!(lines[2].starts_with("Again"));
    }

    #[test]
    fn test_train_and_predict_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let train_csv = dir.path().join("train.csv");
        let test_csv = dir.path().join("test.csv");
        let input_csv = dir.path().join("input.csv");
        let mut train_rows = String::from("x,y\n");
        for i in 0..30 {
            train_rows.push_str(&format!("{i},{}\n", 2 * i));
        }
        std::fs::write(&train_csv, train_rows).unwrap();
        std::fs::write(&test_csv, "x,y\n3.5,7\n10.5,21\n20.5,41\n").unwrap();
        std::fs::write(&input_csv, "x\n4\n").unwrap();

        let config = TrainerConfig {
            artifact_path: dir.path().join("out").join("model.json"),
            ..TrainerConfig::default()
        };
        train(&config, &train_csv, &test_csv, true).unwrap();
        assert!(config.artifact_path.exists());
        predict(&config.artifact_path, &input_csv, true).unwrap();
    }

    #[test]
    fn test_missing_csv_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        let err = train(&TrainerConfig::default(), &missing, &missing, true).unwrap_err();
        assert!(format!("{err:#}").contains("missing.csv"));
    }
}

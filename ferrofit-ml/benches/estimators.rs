use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ferrofit_ml::Regressor;
use ferrofit_ml::estimators::{
    CatBoostRegressor, DecisionTreeRegressor, GradientBoostingRegressor, KNeighborsRegressor,
    LinearRegression, RandomForestRegressor, XGBRegressor,
};
use ndarray::{Array1, Array2};

fn dataset(rows: usize, cols: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((rows, cols), |(i, j)| ((i * (j + 3) + j) % 97) as f64 / 9.7);
    let y = Array1::from_shape_fn(rows, |i| {
        let row = x.row(i);
        row[0].sin() * 2.0 + row.iter().skip(1).sum::<f64>() * 0.1
    });
    (x, y)
}

fn bench_fit(c: &mut Criterion) {
    let (x, y) = dataset(500, 6);

    c.bench_function("fit_linear_regression", |b| {
        b.iter(|| LinearRegression::new().fit(black_box(&x), black_box(&y)))
    });

    c.bench_function("fit_decision_tree", |b| {
        b.iter(|| DecisionTreeRegressor::new().fit(black_box(&x), black_box(&y)))
    });

    c.bench_function("fit_random_forest_32", |b| {
        b.iter(|| RandomForestRegressor::new(32).fit(black_box(&x), black_box(&y)))
    });

    c.bench_function("fit_gradient_boosting_64", |b| {
        b.iter(|| GradientBoostingRegressor::new(64, 0.1).fit(black_box(&x), black_box(&y)))
    });

    c.bench_function("fit_xgboost_64", |b| {
        b.iter(|| XGBRegressor::new(64, 0.1).fit(black_box(&x), black_box(&y)))
    });

    c.bench_function("fit_catboost_50", |b| {
        b.iter(|| CatBoostRegressor::new(50, 0.1, 6).fit(black_box(&x), black_box(&y)))
    });
}

fn bench_predict(c: &mut Criterion) {
    let (x, y) = dataset(1000, 6);
    let mut knn = KNeighborsRegressor::with_k(5);
    knn.fit(&x, &y).unwrap();

    c.bench_function("predict_knn_1000", |b| {
        b.iter(|| knn.predict(black_box(&x)))
    });
}

criterion_group!(benches, bench_fit, bench_predict);
criterion_main!(benches);

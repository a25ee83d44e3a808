//! End-to-end tests: load, generate features, train and score from one
//! configuration file.

use polars::prelude::*;
use stagehand::config::RunConfig;
use stagehand::data::load_data;
use stagehand::pipeline::generate_features;
use stagehand::scoring::score_model;
use stagehand::training::{ModelMethod, train_model};
use std::path::Path;
use tempfile::TempDir;

const COLOURS: [&str; 3] = ["red", "green", "blue"];

fn write_raw_csv(path: &Path) {
    let mut csv = String::from("age,colour,income,churned\n");
    for i in 0..40 {
        let age = 20 + i;
        let colour = COLOURS[i % 3];
        let income = 1000.0 + (i * 37 % 11) as f64 * 10.5;
        let churned = i32::from(age >= 40);
        csv.push_str(&format!("{age},{colour},{income},{churned}\n"));
    }
    std::fs::write(path, csv).unwrap();
}

fn run_config(dir: &Path) -> RunConfig {
    let d = dir.display();
    RunConfig::from_yaml(&format!(
        "\
load_data:
  how: csv
  csv:
    path: {d}/raw.csv
generate_features:
  make_categorical:
    columns: colour
    colour:
      categories: [red, green, blue]
      one_hot_encode: true
  bin_values:
    columns: age
    bins: 4
    new_column: true
  choose_features:
    features_to_use: [age, age_binned, colour]
    target: churned
  save_dataset: {d}/features.csv
train_model:
  method: xgboost
  params:
    n_estimators: 20
    max_depth: 3
  choose_features:
    features_to_use: [age, age_binned, colour]
  get_target:
    target: churned
  split_data:
    train_size: 0.75
    test_size: 0.25
    random_state: 3
    save_split_prefix: {d}/split
  save_tmo: {d}/model.tmo
score_model:
  path_to_tmo: {d}/model.tmo
  save_scores: {d}/scores.csv
"
    ))
    .unwrap()
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_features_train_score() {
    let dir = TempDir::new().unwrap();
    write_raw_csv(&dir.path().join("raw.csv"));
    let config = run_config(dir.path());

    // generate_features
    let raw = load_data(&config.data_source(None).unwrap()).await.unwrap();
    assert_eq!(raw.height(), 40);

    let (features, report) = generate_features(raw, config.features().unwrap(), None).unwrap();
    assert_eq!(
        column_names(features.frame()),
        vec![
            "age",
            "churned",
            "colour_dummy_0",
            "colour_dummy_1",
            "colour_dummy_2",
            "age_binned"
        ]
    );
    assert_eq!(report.dropped_columns, vec!["income"]);
    assert_eq!(report.steps_applied, 2);
    assert!(dir.path().join("features.csv").exists());

    // one indicator set per row, following the declared category order
    let red = features
        .frame()
        .column("colour_dummy_0")
        .unwrap()
        .as_materialized_series()
        .i32()
        .unwrap()
        .clone();
    assert_eq!(red.get(0), Some(1));
    assert_eq!(red.get(1), Some(0));
    assert_eq!(red.get(3), Some(1));

    // train_model
    let outcome = train_model(features.frame(), config.training().unwrap()).unwrap();
    assert_eq!(outcome.artifact.method, ModelMethod::Xgboost);
    assert_eq!(
        outcome.artifact.feature_names,
        vec!["age", "colour_dummy_0", "colour_dummy_1", "colour_dummy_2", "age_binned"]
    );
    assert_eq!(outcome.split.train.len(), 30);
    assert_eq!(outcome.split.test.as_ref().unwrap().len(), 10);
    assert!(outcome.test_score.unwrap() >= 0.8);
    assert!(dir.path().join("model.tmo").exists());
    assert!(dir.path().join("split-train-features.csv").exists());
    assert!(dir.path().join("split-test-targets.csv").exists());

    // score_model
    let scores = score_model(features.frame(), config.scoring().unwrap()).unwrap();
    assert_eq!(scores.len(), 40);
    let truth = features
        .frame()
        .column("churned")
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Float64)
        .unwrap();
    let correct = scores
        .f64()
        .unwrap()
        .into_iter()
        .zip(truth.f64().unwrap())
        .filter(|(p, t)| p == t)
        .count();
    assert!(correct >= 36, "only {correct} of 40 rows scored correctly");
    assert!(dir.path().join("scores.csv").exists());
}

#[tokio::test]
async fn test_feature_generation_is_deterministic() {
    let dir = TempDir::new().unwrap();
    write_raw_csv(&dir.path().join("raw.csv"));
    let config = run_config(dir.path());
    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");

    for out in [&first, &second] {
        let raw = load_data(&config.data_source(None).unwrap()).await.unwrap();
        generate_features(raw, config.features().unwrap(), Some(out)).unwrap();
    }

    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
    // the override replaces save_dataset
    assert!(!dir.path().join("features.csv").exists());
}

#[tokio::test]
async fn test_training_is_reproducible() {
    let dir = TempDir::new().unwrap();
    write_raw_csv(&dir.path().join("raw.csv"));
    let config = run_config(dir.path());

    let raw = load_data(&config.data_source(None).unwrap()).await.unwrap();
    let (features, _) = generate_features(raw, config.features().unwrap(), None).unwrap();

    let a = train_model(features.frame(), config.training().unwrap()).unwrap();
    let b = train_model(features.frame(), config.training().unwrap()).unwrap();

    assert!(a.split.train.features.equals(&b.split.train.features));
    assert_eq!(
        a.artifact.predict_proba(features.frame()).unwrap(),
        b.artifact.predict_proba(features.frame()).unwrap()
    );
}

#[tokio::test]
async fn test_csv_override_and_missing_input() {
    let dir = TempDir::new().unwrap();
    let config = run_config(dir.path());

    // raw.csv was never written
    let err = load_data(&config.data_source(None).unwrap()).await.unwrap_err();
    assert!(matches!(err, stagehand::error::PipelineError::ResourceMissing(_)));

    let other = dir.path().join("other.csv");
    write_raw_csv(&other);
    let df = load_data(&config.data_source(Some(&other)).unwrap()).await.unwrap();
    assert_eq!(df.width(), 4);
}

#[test]
fn test_unknown_step_rejected_before_loading() {
    let err = RunConfig::from_yaml("generate_features:\n  standardize:\n    columns: age\n").unwrap_err();
    assert!(err.is_configuration());
}

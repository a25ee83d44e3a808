//! The `score_model` stage: apply a persisted model to new data.

use crate::data::save_series;
use crate::error::Result;
use crate::training::ModelArtifact;
use crate::utils::{Timer, expand_path_template};
use polars::prelude::*;
use serde::Deserialize;
use std::path::PathBuf;

/// Name of the score column
pub const SCORE_COLUMN: &str = "prediction";

/// The `score_model` block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreConfig {
    /// Trained model object written by `train_model`
    pub path_to_tmo: PathBuf,

    #[serde(default)]
    pub save_scores: Option<PathBuf>,

    #[serde(default)]
    pub predict: PredictOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictOptions {
    /// Positive-class probabilities instead of labels
    pub probabilities: bool,
}

/// Load the model and score every row of `df`.
pub fn score_model(df: &DataFrame, config: &ScoreConfig) -> Result<Series> {
    let artifact = ModelArtifact::load(&expand_path_template(&config.path_to_tmo))?;

    let scores = {
        let _timer = Timer::new("scoring");
        if config.predict.probabilities {
            artifact.predict_proba(df)?
        } else {
            artifact.predict(df)?
        }
    };
    let scores = Series::new(SCORE_COLUMN.into(), scores.to_vec());
    tracing::info!("{} rows scored with {} model", scores.len(), artifact.method);

    if let Some(path) = &config.save_scores {
        let path = expand_path_template(path);
        save_series(&scores, &path)?;
        tracing::info!("Scores saved to {}", path.display());
    }

    Ok(scores)
}

//! The `train_model` stage.

use super::model::{ModelArtifact, ModelMethod, ModelSpec};
use super::split::{Partition, PartitionedDataset, SplitConfig, split_data};
use crate::error::Result;
use crate::pipeline::{ChooseFeatures, Dataset, GetTarget, choose_features, get_target};
use crate::utils::{Timer, expand_path_template};
use polars::prelude::*;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTrainConfig {
    method: ModelMethod,
    #[serde(default)]
    save_tmo: Option<PathBuf>,
    #[serde(default)]
    choose_features: Option<ChooseFeatures>,
    #[serde(default)]
    get_target: Option<GetTarget>,
    #[serde(default)]
    split_data: SplitConfig,
    #[serde(default)]
    params: serde_yaml::Value,
    #[serde(default)]
    fit: serde_yaml::Value,
}

/// The `train_model` block.
///
/// `params` and `fit` are interpreted against the chosen `method` while the
/// configuration is parsed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTrainConfig")]
pub struct TrainConfig {
    pub model: ModelSpec,

    /// Where to write the trained model object
    pub save_tmo: Option<PathBuf>,

    pub choose_features: Option<ChooseFeatures>,
    pub get_target: Option<GetTarget>,
    pub split_data: SplitConfig,
}

impl TryFrom<RawTrainConfig> for TrainConfig {
    type Error = crate::error::PipelineError;

    fn try_from(raw: RawTrainConfig) -> Result<Self> {
        Ok(Self {
            model: ModelSpec::from_parts(raw.method, raw.params, raw.fit)?,
            save_tmo: raw.save_tmo,
            choose_features: raw.choose_features,
            get_target: raw.get_target,
            split_data: raw.split_data,
        })
    }
}

/// A trained model plus the partitions it was trained and evaluated on.
pub struct TrainOutcome {
    pub artifact: ModelArtifact,
    pub split: PartitionedDataset,

    /// Metric on the test partition, when there is one
    pub test_score: Option<f64>,
}

/// Select features, extract the target, split, fit and optionally persist.
pub fn train_model(df: &DataFrame, config: &TrainConfig) -> Result<TrainOutcome> {
    let features = match &config.choose_features {
        Some(args) => choose_features(Dataset::new(df.clone()), args)?.0.into_frame(),
        None => df.clone(),
    };

    let target = config
        .get_target
        .as_ref()
        .map(|args| get_target(df, args))
        .transpose()?;

    // The target never feeds the model, even if choose_features kept it.
    let features = match &target {
        Some(t) if features.column(t.name().as_str()).is_ok() => features.drop(t.name().as_str())?,
        _ => features,
    };

    let split = split_data(&features, target.as_ref(), &config.split_data)?;
    tracing::info!(
        "Training {} on {} rows and {} features",
        config.model.method(),
        split.train.len(),
        features.width()
    );

    let model = {
        let _timer = Timer::new("model training");
        config.model.fit(&split.train, split.validate.as_ref())?
    };

    let feature_names = features
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let artifact = ModelArtifact::new(feature_names, model);

    let test_score = split
        .test
        .as_ref()
        .map(|test| score_partition(&artifact, &config.model, test))
        .transpose()?
        .flatten();

    if let Some(path) = &config.save_tmo {
        let path = expand_path_template(path);
        artifact.save(&path)?;
        tracing::info!("Trained model object saved to {}", path.display());
    }

    Ok(TrainOutcome {
        artifact,
        split,
        test_score,
    })
}

fn score_partition(artifact: &ModelArtifact, spec: &ModelSpec, test: &Partition) -> Result<Option<f64>> {
    let Some(target) = &test.target else {
        return Ok(None);
    };
    let predicted = artifact.predict(&test.features)?;
    let truth = target.cast(&DataType::Float64)?;
    let pairs: Vec<(f64, f64)> = predicted
        .iter()
        .zip(truth.f64()?.into_iter())
        .filter_map(|(p, t)| t.map(|t| (*p, t)))
        .collect();
    if pairs.is_empty() {
        return Ok(None);
    }

    let n = pairs.len() as f64;
    let score = if spec.metric_name() == "accuracy" {
        pairs.iter().filter(|(p, t)| (p - t).abs() < f64::EPSILON).count() as f64 / n
    } else {
        (pairs.iter().map(|(p, t)| (p - t).powi(2)).sum::<f64>() / n).sqrt()
    };
    tracing::info!("test {}: {score:.4}", spec.metric_name());
    Ok(Some(score))
}

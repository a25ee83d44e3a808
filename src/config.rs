//! Run configuration.
//!
//! One YAML file drives every stage. Each stage reads only its own section,
//! so a single file can hold all of them:
//!
//! ```yaml
//! load_data:
//!   how: csv
//!   csv:
//!     path: data/customers.csv
//! generate_features:
//!   bin_values:
//!     columns: age
//!     quartiles: 4
//!   choose_features:
//!     features_to_use: [age, income]
//! train_model:
//!   method: logistic
//!   get_target:
//!     target: churned
//!   save_tmo: models/churn.tmo
//! score_model:
//!   path_to_tmo: models/churn.tmo
//! ```

use crate::data::LoadDataConfig;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::pipeline::FeatureConfig;
use crate::scoring::ScoreConfig;
use crate::training::TrainConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub load_data: Option<LoadDataConfig>,

    #[serde(default)]
    pub generate_features: Option<FeatureConfig>,

    #[serde(default)]
    pub train_model: Option<TrainConfig>,

    #[serde(default)]
    pub score_model: Option<ScoreConfig>,
}

impl RunConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::ResourceMissing(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid configuration {}", path.display()))
    }

    /// Checks that need no data.
    ///
    /// Step arguments and model hyperparameters are already checked while
    /// parsing.
    pub fn validate(&self) -> Result<()> {
        if let Some(load) = &self.load_data {
            load.validate().context("load_data")?;
        }
        if let Some(train) = &self.train_model {
            train.split_data.validate().context("train_model.split_data")?;
        }
        Ok(())
    }

    pub fn features(&self) -> Result<&FeatureConfig> {
        self.generate_features
            .as_ref()
            .ok_or_else(|| missing_section("generate_features"))
    }

    pub fn training(&self) -> Result<&TrainConfig> {
        self.train_model
            .as_ref()
            .ok_or_else(|| missing_section("train_model"))
    }

    pub fn scoring(&self) -> Result<&ScoreConfig> {
        self.score_model
            .as_ref()
            .ok_or_else(|| missing_section("score_model"))
    }

    /// The data source, with `csv_override` taking precedence.
    pub fn data_source(&self, csv_override: Option<&Path>) -> Result<LoadDataConfig> {
        match (csv_override, &self.load_data) {
            (Some(path), _) => Ok(LoadDataConfig::from_csv_path(path)),
            (None, Some(load)) => Ok(load.clone()),
            (None, None) => Err(PipelineError::Configuration(
                "no data source: pass --csv or add a load_data section".to_owned(),
            )),
        }
    }
}

fn missing_section(name: &str) -> PipelineError {
    PipelineError::Configuration(format!("configuration has no '{name}' section"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const FULL: &str = "\
load_data:
  how: csv
  csv:
    path: data/in.csv
generate_features:
  one_hot_encode:
    columns: colour
  choose_features:
    features_to_use: [colour]
train_model:
  method: linear_regression
  get_target:
    target: y
  split_data:
    train_size: 0.8
    test_size: 0.2
score_model:
  path_to_tmo: models/m.tmo
";

    #[test]
    fn test_full_config() {
        let config = RunConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.features().unwrap().step_names(), vec!["one_hot_encode"]);
        assert_eq!(
            config.scoring().unwrap().path_to_tmo,
            PathBuf::from("models/m.tmo")
        );
        assert_eq!(
            config.data_source(None).unwrap().csv_path(),
            Some(Path::new("data/in.csv"))
        );
    }

    #[test]
    fn test_csv_override_wins() {
        let config = RunConfig::from_yaml(FULL).unwrap();
        let source = config.data_source(Some(Path::new("other.csv"))).unwrap();
        assert_eq!(source.csv_path(), Some(Path::new("other.csv")));
    }

    #[test]
    fn test_missing_section_and_source() {
        let config = RunConfig::from_yaml("score_model:\n  path_to_tmo: m.tmo\n").unwrap();
        assert!(config.training().unwrap_err().is_configuration());
        assert!(config.data_source(None).unwrap_err().is_configuration());
    }

    #[test]
    fn test_unknown_step_fails_at_load() {
        let err = RunConfig::from_yaml("generate_features:\n  normalize:\n    columns: a\n").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("normalize"));
    }

    #[test]
    fn test_bad_split_fails_at_load() {
        let err = RunConfig::from_yaml(
            "train_model:\n  method: logistic\n  split_data:\n    train_size: 0.5\n    test_size: 0.2\n",
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bad_load_data_fails_at_load() {
        let err = RunConfig::from_yaml("load_data:\n  how: query\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(RunConfig::from_yaml("evaluate_model: {}\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = RunConfig::load(Path::new("no/such/config.yml")).unwrap_err();
        assert!(matches!(err, PipelineError::ResourceMissing(_)));
    }
}

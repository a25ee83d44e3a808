//! Feature-generation configuration.
//!
//! The `generate_features` block is a YAML mapping whose keys are step names
//! and whose values are that step's arguments. Mapping order is execution
//! order; three keys are reserved and never run as steps:
//!
//! ```yaml
//! generate_features:
//!   make_categorical:
//!     columns: colour
//!     colour:
//!       categories: [red, green, blue]
//!   bin_values:
//!     columns: [age]
//!     bins: 4
//!   one_hot_encode:
//!     columns: colour
//!   choose_features:
//!     features_to_use: [age, colour]
//!   save_dataset: out/features.csv
//! ```

use crate::error::{PipelineError, Result, ResultExt as _, config_err};
use crate::utils::OneOrMany;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Keys of `generate_features` that are handled outside the ordered steps.
pub const RESERVED_KEYS: [&str; 3] = ["choose_features", "get_target", "save_dataset"];

/// Step names accepted in `generate_features`.
pub const STEP_NAMES: [&str; 3] = ["bin_values", "make_categorical", "one_hot_encode"];

/// The parsed `generate_features` block.
#[derive(Debug, Clone, Default)]
pub struct FeatureConfig {
    /// Ordered transformation steps
    pub steps: Vec<Step>,

    /// Applied after every step
    pub choose_features: ChooseFeatures,

    /// Accepted so a block can be shared with `train_model`; generation
    /// itself never extracts a target.
    pub get_target: Option<GetTarget>,

    /// Where to write the final dataset
    pub save_dataset: Option<PathBuf>,
}

impl FeatureConfig {
    /// Build from an ordered YAML mapping, rejecting unknown step names.
    pub fn from_mapping(mapping: serde_yaml::Mapping) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in mapping {
            let Some(name) = key.as_str() else {
                return config_err(format!("generate_features keys must be strings, got {key:?}"));
            };

            match name {
                "choose_features" => {
                    config.choose_features = parse_args(name, value)?;
                }
                "get_target" => {
                    config.get_target = Some(parse_args(name, value)?);
                }
                "save_dataset" => {
                    config.save_dataset = Some(parse_args(name, value)?);
                }
                _ => config.steps.push(Step::parse(name, value)?),
            }
        }

        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mapping: serde_yaml::Mapping =
            serde_yaml::from_str(yaml).context("generate_features must be a mapping")?;
        Self::from_mapping(mapping)
    }

    /// Step names in execution order
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(Step::name).collect()
    }
}

impl<'de> Deserialize<'de> for FeatureConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
        Self::from_mapping(mapping).map_err(serde::de::Error::custom)
    }
}

fn parse_args<T>(name: &str, value: serde_yaml::Value) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    // A bare key (`one_hot_encode:`) means "no arguments".
    let value = if value.is_null() {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    } else {
        value
    };
    serde_yaml::from_value(value).with_context(|| format!("invalid arguments for '{name}'"))
}

/// A named transformation applied to the dataset.
#[derive(Debug, Clone)]
pub enum Step {
    BinValues(BinValues),
    MakeCategorical(MakeCategorical),
    OneHotEncode(OneHotEncode),
}

impl Step {
    /// Resolve `name` against the known steps and parse its arguments.
    pub fn parse(name: &str, args: serde_yaml::Value) -> Result<Self> {
        let step = match name {
            "bin_values" => Self::BinValues(parse_args(name, args)?),
            "make_categorical" => Self::MakeCategorical(parse_args(name, args)?),
            "one_hot_encode" => Self::OneHotEncode(parse_args(name, args)?),
            other => {
                return Err(PipelineError::Configuration(format!(
                    "unknown step '{other}' (expected one of: {}; reserved: {})",
                    STEP_NAMES.join(", "),
                    RESERVED_KEYS.join(", ")
                )));
            }
        };
        step.check()?;
        Ok(step)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BinValues(_) => "bin_values",
            Self::MakeCategorical(_) => "make_categorical",
            Self::OneHotEncode(_) => "one_hot_encode",
        }
    }

    /// Columns the step reads.
    pub fn input_columns(&self) -> Vec<String> {
        match self {
            Self::BinValues(args) => args.columns.to_vec(),
            Self::MakeCategorical(args) => args.columns.to_vec(),
            Self::OneHotEncode(args) => args.columns.to_vec(),
        }
    }

    fn check(&self) -> Result<()> {
        match self {
            Self::BinValues(args) => args.check(),
            Self::MakeCategorical(args) => args.check(),
            Self::OneHotEncode(args) => {
                if args.columns.to_vec().is_empty() {
                    return config_err("one_hot_encode needs at least one column");
                }
                Ok(())
            }
        }
    }
}

/// A setting given once for every column or per column.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PerColumn<T> {
    Shared(T),
    ByColumn(BTreeMap<String, T>),
}

impl<T> PerColumn<T> {
    pub fn for_column(&self, column: &str) -> Option<&T> {
        match self {
            Self::Shared(v) => Some(v),
            Self::ByColumn(map) => map.get(column),
        }
    }
}

/// Bin boundaries: a bin count (equal width) or explicit edges.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BinSpec {
    Count(usize),
    Edges(Vec<f64>),
}

/// Arguments of `bin_values`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinValues {
    pub columns: OneOrMany<String>,

    #[serde(default)]
    pub bins: Option<PerColumn<BinSpec>>,

    /// Number of equal-frequency bins
    #[serde(default)]
    pub quartiles: Option<PerColumn<usize>>,

    /// Write `<column>_binned` instead of overwriting
    #[serde(default)]
    pub new_column: bool,
}

impl BinValues {
    fn check(&self) -> Result<()> {
        let columns = self.columns.to_vec();
        if columns.is_empty() {
            return config_err("bin_values needs at least one column");
        }
        match (&self.bins, &self.quartiles) {
            (Some(_), Some(_)) => config_err("bin_values takes either bins or quartiles, not both"),
            (None, None) => config_err("bin_values needs bins or quartiles"),
            (Some(bins), None) => {
                for column in &columns {
                    match bins.for_column(column) {
                        None => return config_err(format!("bin_values: no bins given for '{column}'")),
                        Some(BinSpec::Count(0)) => {
                            return config_err(format!("bin_values: bin count for '{column}' must be positive"));
                        }
                        Some(BinSpec::Edges(edges)) => {
                            if edges.len() < 2 {
                                return config_err(format!("bin_values: '{column}' needs at least two edges"));
                            }
                            if edges.iter().zip(edges.iter().skip(1)).any(|(a, b)| a >= b) {
                                return config_err(format!(
                                    "bin_values: edges for '{column}' must increase monotonically"
                                ));
                            }
                        }
                        Some(BinSpec::Count(_)) => {}
                    }
                }
                Ok(())
            }
            (None, Some(quartiles)) => {
                for column in &columns {
                    match quartiles.for_column(column) {
                        None | Some(0) => {
                            return config_err(format!(
                                "bin_values: quartiles for '{column}' must be a positive count"
                            ));
                        }
                        Some(_) => {}
                    }
                }
                Ok(())
            }
        }
    }
}

/// Where the categories of a column come from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CategoryOptions {
    /// Explicit category order
    pub categories: Option<Vec<serde_yaml::Value>>,

    /// Read the categories from a file
    pub read_csv: Option<CategoryFile>,

    /// One-hot encode this column right after conversion
    pub one_hot_encode: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryFile {
    pub path: PathBuf,

    /// Column holding the categories (the first column when omitted)
    #[serde(default)]
    pub column: Option<String>,
}

/// Arguments of `make_categorical`.
///
/// Per-column options sit next to `columns`, keyed by the column name.
#[derive(Debug, Clone, Deserialize)]
pub struct MakeCategorical {
    pub columns: OneOrMany<String>,

    /// One-hot encode every listed column
    #[serde(default)]
    pub one_hot: bool,

    #[serde(flatten)]
    pub options: BTreeMap<String, CategoryOptions>,
}

impl MakeCategorical {
    pub fn options_for(&self, column: &str) -> CategoryOptions {
        self.options.get(column).cloned().unwrap_or_default()
    }

    fn check(&self) -> Result<()> {
        let columns = self.columns.to_vec();
        if columns.is_empty() {
            return config_err("make_categorical needs at least one column");
        }
        for (column, options) in &self.options {
            if !columns.contains(column) {
                return config_err(format!(
                    "make_categorical: options given for '{column}', which is not listed in columns"
                ));
            }
            if options.categories.is_some() && options.read_csv.is_some() {
                return config_err(format!(
                    "make_categorical: '{column}' takes either categories or read_csv, not both"
                ));
            }
        }
        Ok(())
    }
}

/// Arguments of `one_hot_encode`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OneHotEncode {
    pub columns: OneOrMany<String>,

    #[serde(default = "default_true")]
    pub drop_original: bool,
}

/// Arguments of `choose_features`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChooseFeatures {
    /// Allow-list of source column names; `None` keeps everything
    pub features_to_use: Option<Vec<String>>,

    /// Column kept regardless of the allow-list
    pub target: Option<String>,

    pub save_path: Option<PathBuf>,
}

/// Arguments of `get_target`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetTarget {
    pub target: String,

    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_keep_declaration_order() {
        let config = FeatureConfig::from_yaml(
            "one_hot_encode:\n  columns: b\nbin_values:\n  columns: a\n  bins: 3\nchoose_features:\n  features_to_use: [a, b]\nmake_categorical:\n  columns: c",
        )
        .unwrap();

        assert_eq!(
            config.step_names(),
            vec!["one_hot_encode", "bin_values", "make_categorical"]
        );
        assert_eq!(
            config.choose_features.features_to_use,
            Some(vec!["a".to_owned(), "b".to_owned()])
        );
    }

    #[test]
    fn test_unknown_step_rejected_at_parse_time() {
        let err = FeatureConfig::from_yaml("scale_values:\n  columns: a").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("scale_values"));
    }

    #[test]
    fn test_bins_and_quartiles_are_exclusive() {
        let err = FeatureConfig::from_yaml("bin_values:\n  columns: a\n  bins: 3\n  quartiles: 4")
            .unwrap_err();
        assert!(err.is_configuration());

        let err = FeatureConfig::from_yaml("bin_values:\n  columns: a").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_bin_spec_forms() {
        let config = FeatureConfig::from_yaml(
            "bin_values:\n  columns: [a, b]\n  bins:\n    a: 4\n    b: [0, 10, 20]",
        )
        .unwrap();
        let Step::BinValues(args) = &config.steps[0] else {
            panic!("expected bin_values");
        };
        let bins = args.bins.as_ref().unwrap();
        assert_eq!(bins.for_column("a"), Some(&BinSpec::Count(4)));
        assert_eq!(
            bins.for_column("b"),
            Some(&BinSpec::Edges(vec![0.0, 10.0, 20.0]))
        );
    }

    #[test]
    fn test_bin_edges_must_increase() {
        let err = FeatureConfig::from_yaml("bin_values:\n  columns: a\n  bins: [5, 1]").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_make_categorical_per_column_options() {
        let config = FeatureConfig::from_yaml(
            "make_categorical:\n  columns: [colour, size]\n  colour:\n    categories: [red, green]\n    one_hot_encode: true",
        )
        .unwrap();
        let Step::MakeCategorical(args) = &config.steps[0] else {
            panic!("expected make_categorical");
        };
        let colour = args.options_for("colour");
        assert!(colour.one_hot_encode);
        assert_eq!(colour.categories.map(|c| c.len()), Some(2));
        assert!(args.options_for("size").categories.is_none());
    }

    #[test]
    fn test_make_categorical_options_for_unlisted_column() {
        let err = FeatureConfig::from_yaml(
            "make_categorical:\n  columns: colour\n  size:\n    categories: [s, m]",
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_reserved_keys_are_not_steps() {
        let config = FeatureConfig::from_yaml(
            "get_target:\n  target: y\nsave_dataset: out/features.csv",
        )
        .unwrap();
        assert!(config.steps.is_empty());
        assert_eq!(config.get_target.unwrap().target, "y");
        assert_eq!(config.save_dataset, Some(PathBuf::from("out/features.csv")));
    }

    #[test]
    fn test_bare_step_key_means_no_arguments() {
        let err = FeatureConfig::from_yaml("one_hot_encode:").unwrap_err();
        assert!(err.is_configuration());
    }
}

//! Declarative feature generation.
//!
//! A `generate_features` block names transformation steps in the order they
//! should run. Each step name resolves to a typed argument struct at parse
//! time, so unknown steps and malformed arguments fail before any data is
//! loaded.
//!
//! # Steps
//!
//! - `bin_values`: equal-width, explicit-edge or quantile binning
//! - `make_categorical`: fixed category order, optionally one-hot encoded
//! - `one_hot_encode`: `<column>_dummy_<i>` indicator columns
//!
//! After the steps, `choose_features` keeps the allow-listed columns (and
//! their indicator columns), and `save_dataset` persists the result.
//!
//! # Example
//!
//! ```no_run
//! use stagehand::pipeline::{FeatureConfig, generate_features};
//! use polars::prelude::*;
//!
//! let config = FeatureConfig::from_yaml(
//!     "one_hot_encode:\n  columns: colour\nchoose_features:\n  features_to_use: [colour]",
//! )?;
//! let df = df!("colour" => ["red", "blue"])?;
//! let (dataset, report) = generate_features(df, &config, None)?;
//! assert_eq!(dataset.width(), 2);
//! println!("{}", report.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod dataset;
pub mod executor;
pub mod spec;
pub mod steps;
pub mod validation;

pub use dataset::{DUMMY_SEPARATOR, Dataset, dummy_source};
pub use executor::{RunReport, generate_features};
pub use spec::{
    BinSpec, BinValues, ChooseFeatures, FeatureConfig, GetTarget, MakeCategorical, OneHotEncode,
    PerColumn, Step,
};
pub use steps::{bin_values, choose_features, get_target, make_categorical, one_hot_encode};
pub use validation::{ValidationError, validate_pipeline};

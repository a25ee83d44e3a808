//! # stagehand - configuration-driven model pipelines
//!
//! stagehand runs the stages of a tabular machine-learning model from a
//! single YAML file: load data, generate features, train, score. A
//! golden-file regression harness checks that the stages keep producing
//! the same outputs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stagehand::config::RunConfig;
//! use stagehand::data::load_data;
//! use stagehand::pipeline::generate_features;
//! use stagehand::training::train_model;
//!
//! # async fn example() -> stagehand::error::Result<()> {
//! let config = RunConfig::load("config/run.yml".as_ref())?;
//! let df = load_data(&config.data_source(None)?).await?;
//!
//! let (features, report) = generate_features(df, config.features()?, None)?;
//! tracing::info!("{}", report.summary());
//!
//! let outcome = train_model(features.frame(), config.training()?)?;
//! tracing::info!("test score: {:?}", outcome.test_score);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`config`]: the run configuration, one optional section per stage
//! - [`data`]: CSV and PostgreSQL loading, CSV persistence
//! - [`pipeline`]: ordered feature steps (`bin_values`, `make_categorical`,
//!   `one_hot_encode`) plus feature and target selection
//! - [`training`]: seeded splits, estimators and the persisted model artifact
//! - [`scoring`]: applying a persisted model to new data
//! - [`harness`]: golden-file regression tests over external commands
//! - [`error`]: error types and handling utilities
//! - [`logging`]: `tracing` subscriber setup
//! - [`utils`]: common utility functions
//!
//! ## Errors
//!
//! Every fallible operation returns [`error::Result`]. Configuration
//! problems are detected while the YAML is parsed, before any data is read.

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod data;
pub mod error;
pub mod harness;
pub mod logging;
pub mod pipeline;
pub mod scoring;
pub mod training;
pub mod utils;

//! Feature generation engine.
//!
//! Applies the ordered steps of a [`FeatureConfig`] to a dataset, then the
//! column selection, and reports what changed.

use super::dataset::Dataset;
use super::spec::{FeatureConfig, Step};
use super::steps;
use super::validation::validate_pipeline;
use crate::data::save_df;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::utils::expand_path_template;
use std::path::Path;

/// Report generated after feature generation
#[derive(Debug, Clone)]
pub struct RunReport {
    pub rows: usize,

    /// Number of columns before processing
    pub columns_before: usize,

    /// Number of columns after processing
    pub columns_after: usize,

    /// Number of steps applied
    pub steps_applied: usize,

    /// Columns removed by `choose_features`
    pub dropped_columns: Vec<String>,

    /// Time taken for execution
    pub duration: std::time::Duration,
}

impl RunReport {
    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Features generated: {} rows, columns {} → {} ({}), {} steps, {} dropped, {:.2}s",
            self.rows,
            self.columns_before,
            self.columns_after,
            match self.columns_after.cmp(&self.columns_before) {
                std::cmp::Ordering::Greater => "added",
                std::cmp::Ordering::Less => "removed",
                std::cmp::Ordering::Equal => "unchanged",
            },
            self.steps_applied,
            self.dropped_columns.len(),
            self.duration.as_secs_f64()
        )
    }
}

/// Run every configured step on `input`, then select the features.
///
/// The dataset is written to `output_override` if given, else to
/// `save_dataset` when configured.
pub fn generate_features(
    input: impl Into<Dataset>,
    config: &FeatureConfig,
    output_override: Option<&Path>,
) -> Result<(Dataset, RunReport)> {
    let start = std::time::Instant::now();
    let mut ds: Dataset = input.into();
    let columns_before = ds.width();

    let validation_errors = validate_pipeline(config, &ds.column_names());
    if !validation_errors.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "Feature pipeline validation failed:\n{}",
            validation_errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        )));
    }

    let mut steps_applied = 0;
    for (idx, step) in config.steps.iter().enumerate() {
        tracing::debug!("Applying step {} ({})", idx + 1, step.name());
        ds = apply_step(step, ds).with_context(|| format!("Step {} ({})", idx + 1, step.name()))?;
        steps_applied += 1;
    }

    let (mut ds, dropped_columns) = steps::choose_features(ds, &config.choose_features)?;

    let output = output_override
        .map(Path::to_path_buf)
        .or_else(|| config.save_dataset.as_deref().map(expand_path_template));
    if let Some(path) = output {
        save_df(ds.frame_mut(), &path)?;
        tracing::info!("Dataset saved to {}", path.display());
    }

    let report = RunReport {
        rows: ds.height(),
        columns_before,
        columns_after: ds.width(),
        steps_applied,
        dropped_columns,
        duration: start.elapsed(),
    };
    tracing::info!("{}", report.summary());

    Ok((ds, report))
}

/// Apply a single transformation step
fn apply_step(step: &Step, ds: Dataset) -> Result<Dataset> {
    match step {
        Step::BinValues(args) => steps::bin_values(ds, args),
        Step::MakeCategorical(args) => steps::make_categorical(ds, args),
        Step::OneHotEncode(args) => steps::one_hot_encode(ds, &args.columns.to_vec(), args.drop_original),
    }
}

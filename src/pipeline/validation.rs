//! Pre-flight validation of feature steps.
//!
//! Tracks the column set through the ordered steps so that a step reading a
//! column that cannot exist at that point is reported before any data is
//! touched, with every problem listed at once.

use super::spec::{FeatureConfig, Step};
use std::collections::HashSet;

/// Validation error with helpful context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub step_index: usize,
    pub step_name: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Step {} ({}): {}",
            self.step_index + 1,
            self.step_name,
            self.message
        )
    }
}

/// Validate the steps of `config` against the initial column names.
pub fn validate_pipeline(config: &FeatureConfig, input_columns: &[String]) -> Vec<ValidationError> {
    let mut columns: HashSet<String> = input_columns.iter().cloned().collect();
    let mut errors = Vec::new();

    for (idx, step) in config.steps.iter().enumerate() {
        validate_step(step, idx, &mut columns, &mut errors);
    }

    errors
}

fn validate_step(
    step: &Step,
    idx: usize,
    columns: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    let mut missing = |column: &str| {
        errors.push(ValidationError {
            step_index: idx,
            step_name: step.name(),
            message: format!("column '{column}' does not exist at this point"),
        });
    };

    for column in step.input_columns() {
        if !columns.contains(&column) {
            missing(&column);
        }
    }

    match step {
        Step::BinValues(args) => {
            if args.new_column {
                for column in args.columns.to_vec() {
                    columns.insert(format!("{column}_binned"));
                }
            }
        }
        Step::MakeCategorical(args) => {
            // Indicator columns are unknown until the data is seen; only the
            // disappearance of the source column matters downstream.
            for column in args.columns.to_vec() {
                if args.one_hot || args.options_for(&column).one_hot_encode {
                    columns.remove(&column);
                }
            }
        }
        Step::OneHotEncode(args) => {
            if args.drop_original {
                for column in args.columns.to_vec() {
                    columns.remove(&column);
                }
            }
        }
    }
}

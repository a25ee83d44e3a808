//! Reproducible train / validate / test partitioning.

use crate::data::{save_df, save_series};
use crate::error::{PipelineError, Result, config_err};
use polars::prelude::*;
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const PROPORTION_TOLERANCE: f64 = 1e-9;

/// The `split_data` block.
///
/// Sizes are either proportions summing to 1 or row counts summing to the
/// number of rows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub train_size: f64,
    pub test_size: f64,
    pub validate_size: f64,
    pub random_state: u64,

    /// Write each partition to `<prefix>-<partition>-{features,targets}.csv`
    pub save_split_prefix: Option<PathBuf>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_size: 1.0,
            test_size: 0.0,
            validate_size: 0.0,
            random_state: 24,
            save_split_prefix: None,
        }
    }
}

/// Absolute partition sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCounts {
    pub train: usize,
    pub validate: usize,
    pub test: usize,
}

impl SplitConfig {
    fn sizes(&self) -> [f64; 3] {
        [self.train_size, self.test_size, self.validate_size]
    }

    /// Checks that do not depend on the number of rows.
    pub fn validate(&self) -> Result<()> {
        let sizes = self.sizes();
        if sizes.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return config_err(format!(
                "split sizes must be non-negative numbers, got train={} test={} validate={}",
                self.train_size, self.test_size, self.validate_size
            ));
        }

        let total: f64 = sizes.iter().sum();
        if (total - 1.0).abs() < PROPORTION_TOLERANCE || sizes.iter().all(|s| s.fract() == 0.0) {
            Ok(())
        } else {
            config_err(format!(
                "split sizes must be proportions summing to 1 or whole row counts, got sum {total}"
            ))
        }
    }

    /// Resolve the configured sizes into row counts for `rows` rows.
    ///
    /// The test count is whatever remains after train and validate so that
    /// rounding never loses or duplicates a row.
    pub fn counts(&self, rows: usize) -> Result<SplitCounts> {
        self.validate()?;
        let sizes = self.sizes();
        let total: f64 = sizes.iter().sum();
        let n = rows as f64;

        let (train, validate) = if (total - 1.0).abs() < PROPORTION_TOLERANCE {
            (
                (self.train_size * n).round_ties_even(),
                (self.validate_size * n).round_ties_even(),
            )
        } else if sizes.iter().all(|s| s.fract() == 0.0) && (total - n).abs() < PROPORTION_TOLERANCE {
            (self.train_size, self.validate_size)
        } else {
            return config_err(format!(
                "train_size + test_size + validate_size must equal 1 or the number of rows ({rows}), got {total}"
            ));
        };

        let train = train as usize;
        let validate = validate as usize;
        let test = rows
            .checked_sub(train + validate)
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "rounded split sizes exceed the {rows} available rows (train={train}, validate={validate})"
                ))
            })?;

        Ok(SplitCounts {
            train,
            validate,
            test,
        })
    }
}

/// Features and (optionally) the target of one partition.
#[derive(Debug, Clone)]
pub struct Partition {
    pub features: DataFrame,
    pub target: Option<Series>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.features.height()
    }

    pub fn is_empty(&self) -> bool {
        self.features.height() == 0
    }

    fn take(features: &DataFrame, target: Option<&Series>, rows: &[usize]) -> Result<Self> {
        let idx = rows
            .iter()
            .map(|&r| {
                IdxSize::try_from(r).map_err(|_| {
                    PipelineError::DataProcessing(format!("row index {r} exceeds the supported range"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let idx = IdxCa::from_vec("idx".into(), idx);

        Ok(Self {
            features: features.take(&idx)?,
            target: target.map(|t| t.take(&idx)).transpose()?,
        })
    }
}

/// The partitions produced by [`split_data`]; `validate` and `test` are
/// present only when non-empty.
#[derive(Debug, Clone)]
pub struct PartitionedDataset {
    pub train: Partition,
    pub validate: Option<Partition>,
    pub test: Option<Partition>,
}

impl PartitionedDataset {
    /// Present partitions in `train`, `validate`, `test` order.
    pub fn partitions(&self) -> Vec<(&'static str, &Partition)> {
        let mut out = vec![("train", &self.train)];
        if let Some(validate) = &self.validate {
            out.push(("validate", validate));
        }
        if let Some(test) = &self.test {
            out.push(("test", test));
        }
        out
    }

    pub fn total_rows(&self) -> usize {
        self.partitions().iter().map(|(_, p)| p.len()).sum()
    }
}

/// Partition `features` (and `target`) into train, validate and test sets.
///
/// When train covers every row the input is returned unshuffled as `train`.
/// Otherwise rows are shuffled with `random_state` to split off train, and
/// the remainder is shuffled with `random_state + 1` to separate test from
/// validate.
pub fn split_data(
    features: &DataFrame,
    target: Option<&Series>,
    config: &SplitConfig,
) -> Result<PartitionedDataset> {
    let rows = features.height();
    if let Some(t) = target
        && t.len() != rows
    {
        return Err(PipelineError::DataProcessing(format!(
            "features have {rows} rows but the target has {}",
            t.len()
        )));
    }

    let counts = config.counts(rows)?;
    tracing::debug!(
        "Splitting {rows} rows into train={} validate={} test={}",
        counts.train,
        counts.validate,
        counts.test
    );

    let split = if counts.train == rows {
        PartitionedDataset {
            train: Partition {
                features: features.clone(),
                target: target.cloned(),
            },
            validate: None,
            test: None,
        }
    } else {
        let mut indices: Vec<usize> = (0..rows).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(config.random_state));
        let (train_rows, remainder) = indices.split_at(counts.train);

        let mut remainder = remainder.to_vec();
        remainder.shuffle(&mut StdRng::seed_from_u64(config.random_state.wrapping_add(1)));
        let (test_rows, validate_rows) = remainder.split_at(counts.test);

        let non_empty = |part: &[usize]| -> Result<Option<Partition>> {
            if part.is_empty() {
                Ok(None)
            } else {
                Partition::take(features, target, part).map(Some)
            }
        };

        PartitionedDataset {
            train: Partition::take(features, target, train_rows)?,
            validate: non_empty(validate_rows)?,
            test: non_empty(test_rows)?,
        }
    };

    if let Some(prefix) = &config.save_split_prefix {
        save_split(&split, prefix)?;
    }

    Ok(split)
}

fn split_file(prefix: &Path, partition: &str, kind: &str) -> PathBuf {
    PathBuf::from(format!("{}-{partition}-{kind}.csv", prefix.display()))
}

fn save_split(split: &PartitionedDataset, prefix: &Path) -> Result<()> {
    for (name, partition) in split.partitions() {
        let features_path = split_file(prefix, name, "features");
        save_df(&mut partition.features.clone(), &features_path)?;

        if let Some(target) = &partition.target {
            let targets_path = split_file(prefix, name, "targets");
            save_series(target, &targets_path)?;
            tracing::info!(
                "X_{name} and y_{name} saved to {} and {}",
                features_path.display(),
                targets_path.display()
            );
        } else {
            tracing::info!("X_{name} saved to {}", features_path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn frame(rows: i64) -> (DataFrame, Series) {
        let ids: Vec<i64> = (0..rows).collect();
        let y: Vec<i64> = ids.iter().map(|i| i % 2).collect();
        (
            df!("id" => ids).unwrap(),
            Series::new("y".into(), y),
        )
    }

    fn ids(partition: &Partition) -> Vec<i64> {
        partition
            .features
            .column("id")
            .unwrap()
            .as_materialized_series()
            .i64()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect()
    }

    fn config(train: f64, test: f64, validate: f64) -> SplitConfig {
        SplitConfig {
            train_size: train,
            test_size: test,
            validate_size: validate,
            ..SplitConfig::default()
        }
    }

    #[test]
    fn test_counts_from_proportions_test_is_remainder() {
        // 0.25 * 10 = 2.5 rounds to 2, 0.35 * 10 = 3.5 rounds to 4
        let counts = config(0.35, 0.4, 0.25).counts(10).unwrap();
        assert_eq!(
            counts,
            SplitCounts {
                train: 4,
                validate: 2,
                test: 4
            }
        );
    }

    #[test]
    fn test_counts_absolute() {
        let counts = config(6.0, 3.0, 1.0).counts(10).unwrap();
        assert_eq!(
            counts,
            SplitCounts {
                train: 6,
                validate: 1,
                test: 3
            }
        );
    }

    #[test]
    fn test_invalid_size_triples() {
        assert!(config(0.5, 0.2, 0.2).counts(10).unwrap_err().is_configuration());
        assert!(config(5.0, 3.0, 1.0).counts(10).unwrap_err().is_configuration());
        assert!(config(-0.5, 1.0, 0.5).counts(10).unwrap_err().is_configuration());
        assert!(config(6.5, 2.5, 1.0).counts(10).unwrap_err().is_configuration());
    }

    #[test]
    fn test_validate_without_rows() {
        assert!(config(0.6, 0.2, 0.2).validate().is_ok());
        assert!(config(60.0, 20.0, 20.0).validate().is_ok());
        assert!(config(0.6, 0.2, 0.1).validate().unwrap_err().is_configuration());
        assert!(config(6.5, 2.5, 1.0).validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_whole_dataset_as_train() {
        let (x, y) = frame(7);
        let split = split_data(&x, Some(&y), &SplitConfig::default()).unwrap();

        assert!(split.validate.is_none());
        assert!(split.test.is_none());
        assert_eq!(ids(&split.train), (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let (x, y) = frame(50);
        for cfg in [config(0.6, 0.2, 0.2), config(0.5, 0.5, 0.0), config(30.0, 5.0, 15.0)] {
            let split = split_data(&x, Some(&y), &cfg).unwrap();
            assert_eq!(split.total_rows(), 50);

            let mut seen = BTreeSet::new();
            for (_, partition) in split.partitions() {
                assert_eq!(partition.target.as_ref().unwrap().len(), partition.len());
                for id in ids(partition) {
                    assert!(seen.insert(id), "row {id} appears twice");
                }
            }
            assert_eq!(seen, (0..50).collect());
        }
    }

    #[test]
    fn test_split_is_reproducible() {
        let (x, y) = frame(40);
        let cfg = config(0.5, 0.25, 0.25);
        let a = split_data(&x, Some(&y), &cfg).unwrap();
        let b = split_data(&x, Some(&y), &cfg).unwrap();

        assert_eq!(ids(&a.train), ids(&b.train));
        assert_eq!(ids(a.test.as_ref().unwrap()), ids(b.test.as_ref().unwrap()));

        let other = split_data(&x, Some(&y), &SplitConfig { random_state: 7, ..cfg }).unwrap();
        assert_ne!(ids(&a.train), ids(&other.train));
    }

    #[test]
    fn test_empty_partitions_are_absent() {
        let (x, _) = frame(10);
        let split = split_data(&x, None, &config(0.7, 0.3, 0.0)).unwrap();

        assert!(split.validate.is_none());
        assert_eq!(split.test.as_ref().unwrap().len(), 3);
        assert!(split.train.target.is_none());
    }

    #[test]
    fn test_length_mismatch() {
        let (x, _) = frame(5);
        let (_, y) = frame(4);
        let err = split_data(&x, Some(&y), &SplitConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DataProcessing(_)));
    }

    #[test]
    fn test_save_split_prefix() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("run");
        let (x, y) = frame(10);
        let cfg = SplitConfig {
            save_split_prefix: Some(prefix),
            ..config(0.6, 0.4, 0.0)
        };
        split_data(&x, Some(&y), &cfg).unwrap();

        assert!(dir.path().join("run-train-features.csv").exists());
        assert!(dir.path().join("run-train-targets.csv").exists());
        assert!(dir.path().join("run-test-features.csv").exists());
        assert!(!dir.path().join("run-validate-features.csv").exists());
    }
}

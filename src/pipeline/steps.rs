//! Implementations of the feature steps.
//!
//! Every step takes the dataset by value and returns the next version.

use super::dataset::{DUMMY_SEPARATOR, Dataset, dummy_source};
use super::spec::{BinSpec, BinValues, CategoryFile, ChooseFeatures, GetTarget, MakeCategorical};
use crate::data::{CsvSource, read_csv, save_df, save_series};
use crate::error::{PipelineError, Result, ResultExt as _, config_err};
use crate::utils::{expand_path_template, yaml_scalar_to_string};
use polars::prelude::*;
use std::collections::HashSet;

fn column_series(frame: &DataFrame, name: &str) -> Result<Series> {
    frame
        .column(name)
        .map(|c| c.as_materialized_series().clone())
        .map_err(|_| PipelineError::Configuration(format!("column '{name}' not found in dataset")))
}

fn float_values(series: &Series) -> Result<Vec<Option<f64>>> {
    if !series.dtype().is_primitive_numeric() {
        return Err(PipelineError::DataProcessing(format!(
            "column '{}' must be numeric to be binned, found {}",
            series.name(),
            series.dtype()
        )));
    }
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

fn string_values(series: &Series) -> Result<Vec<Option<String>>> {
    let cast = series.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect())
}

/// Distinct non-null values in first-appearance order.
fn distinct_in_order(values: Vec<Option<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .flatten()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// bin_values
// ---------------------------------------------------------------------------

/// Replace numeric values by the index of the interval they fall in.
pub fn bin_values(mut ds: Dataset, args: &BinValues) -> Result<Dataset> {
    for column in args.columns.to_vec() {
        let series = column_series(ds.frame(), &column)?;
        let values = float_values(&series)?;

        let (edges, include_lowest) = match (&args.bins, &args.quartiles) {
            (Some(bins), None) => match bins.for_column(&column) {
                Some(BinSpec::Count(count)) => (equal_width_edges(&values, *count)?, false),
                Some(BinSpec::Edges(edges)) => (edges.clone(), false),
                None => return config_err(format!("bin_values: no bins given for '{column}'")),
            },
            (None, Some(quartiles)) => match quartiles.for_column(&column) {
                Some(count) => (quantile_edges(&values, *count)?, true),
                None => return config_err(format!("bin_values: no quartiles given for '{column}'")),
            },
            _ => return config_err("bin_values takes exactly one of bins or quartiles"),
        };

        let codes: Vec<Option<i64>> = values
            .iter()
            .map(|v| v.and_then(|x| bin_index(&edges, x, include_lowest)))
            .collect();

        let output = if args.new_column {
            format!("{column}_binned")
        } else {
            ds.clear_categories(&column);
            column.clone()
        };
        tracing::debug!("Binned '{}' into {} intervals as '{}'", column, edges.len() - 1, output);
        ds.frame_mut()
            .with_column(Series::new(output.as_str().into(), codes))?;
    }
    Ok(ds)
}

fn min_max(values: &[Option<f64>]) -> Option<(f64, f64)> {
    values.iter().flatten().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    let step = (end - start) / count as f64;
    (0..=count)
        .map(|i| if i == count { end } else { start + step * i as f64 })
        .collect()
}

/// `count` equal-width intervals covering the observed range.
///
/// The lowest edge is pushed down by 0.1% of the range so the minimum lands
/// in the first right-closed interval.
fn equal_width_edges(values: &[Option<f64>], count: usize) -> Result<Vec<f64>> {
    let (min, max) = min_max(values).ok_or_else(|| {
        PipelineError::DataProcessing("cannot bin a column without values".to_owned())
    })?;

    if max - min <= 0.0 {
        let adjust = if min == 0.0 { 0.001 } else { 0.001 * min.abs() };
        return Ok(linspace(min - adjust, max + adjust, count));
    }

    let mut edges = linspace(min, max, count);
    if let Some(first) = edges.first_mut() {
        *first -= (max - min) * 0.001;
    }
    Ok(edges)
}

/// Edges at the `count`-quantiles of the values (linear interpolation).
fn quantile_edges(values: &[Option<f64>], count: usize) -> Result<Vec<f64>> {
    let mut sorted: Vec<f64> = values.iter().flatten().copied().collect();
    if sorted.is_empty() {
        return Err(PipelineError::DataProcessing(
            "cannot compute quantiles of a column without values".to_owned(),
        ));
    }
    sorted.sort_by(f64::total_cmp);
    let last = (sorted.len() - 1) as f64;

    let value_at = |pos: f64| {
        let floor = pos.floor();
        let frac = pos - floor;
        let lo = floor as usize;
        match (sorted.get(lo), sorted.get(lo + 1)) {
            (Some(a), Some(b)) => a + (b - a) * frac,
            (Some(a), None) => *a,
            _ => f64::NAN,
        }
    };

    let edges: Vec<f64> = (0..=count)
        .map(|i| value_at(i as f64 / count as f64 * last))
        .collect();

    if edges.iter().zip(edges.iter().skip(1)).any(|(a, b)| a >= b) {
        return Err(PipelineError::DataProcessing(format!(
            "Bin edges must be unique: {edges:?}"
        )));
    }
    Ok(edges)
}

/// Index of the right-closed interval `(edges[i], edges[i + 1]]` holding `value`.
fn bin_index(edges: &[f64], value: f64, include_lowest: bool) -> Option<i64> {
    if include_lowest && edges.first() == Some(&value) {
        return Some(0);
    }
    let upper = edges.partition_point(|e| *e < value);
    if upper == 0 || upper >= edges.len() {
        return None;
    }
    i64::try_from(upper - 1).ok()
}

// ---------------------------------------------------------------------------
// make_categorical / one_hot_encode
// ---------------------------------------------------------------------------

/// Convert columns to categories with a fixed order.
pub fn make_categorical(mut ds: Dataset, args: &MakeCategorical) -> Result<Dataset> {
    for column in args.columns.to_vec() {
        let options = args.options_for(&column);
        let values = string_values(&column_series(ds.frame(), &column)?)?;

        let categories = if let Some(declared) = &options.categories {
            declared
                .iter()
                .map(|v| {
                    yaml_scalar_to_string(v).ok_or_else(|| {
                        PipelineError::Configuration(format!(
                            "make_categorical: categories of '{column}' must be scalars"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else if let Some(file) = &options.read_csv {
            categories_from_file(file)?
        } else {
            distinct_in_order(values.clone())
        };

        let allowed: HashSet<&str> = categories.iter().map(String::as_str).collect();
        let unknown = values
            .iter()
            .flatten()
            .filter(|v| !allowed.contains(v.as_str()))
            .count();
        if unknown > 0 {
            tracing::warn!("{unknown} value(s) of '{column}' are not in its categories and were set to null");
        }
        let converted: Vec<Option<&str>> = values
            .iter()
            .map(|v| v.as_deref().filter(|s| allowed.contains(s)))
            .collect();

        ds.frame_mut()
            .with_column(Series::new(column.as_str().into(), converted))?;
        tracing::debug!("'{}' made categorical with {} categories", column, categories.len());
        ds.set_categories(&column, categories);

        if args.one_hot || options.one_hot_encode {
            ds = one_hot_encode(ds, std::slice::from_ref(&column), true)?;
        }
    }
    Ok(ds)
}

fn categories_from_file(file: &CategoryFile) -> Result<Vec<String>> {
    let df = read_csv(&CsvSource::from_path(expand_path_template(&file.path)))
        .with_context(|| format!("Failed to read categories from {}", file.path.display()))?;

    let series = match &file.column {
        Some(name) => column_series(&df, name)?,
        None => df
            .get_columns()
            .first()
            .map(|c| c.as_materialized_series().clone())
            .ok_or_else(|| {
                PipelineError::DataProcessing(format!(
                    "category file {} has no columns",
                    file.path.display()
                ))
            })?,
    };
    Ok(distinct_in_order(string_values(&series)?))
}

fn sorted_distinct(series: &Series) -> Result<Vec<String>> {
    let sorted = series.drop_nulls().unique()?.sort(SortOptions::default())?;
    Ok(string_values(&sorted)?.into_iter().flatten().collect())
}

/// Append one `Int32` indicator column per category of each column.
///
/// Indicators are named `<column>_dummy_<index>`; the index follows the
/// declared category order, or the sorted distinct values otherwise.
pub fn one_hot_encode(mut ds: Dataset, columns: &[String], drop_original: bool) -> Result<Dataset> {
    let mut indicators = Vec::new();

    for column in columns {
        let categories = match ds.categories(column) {
            Some(declared) => declared.to_vec(),
            None => sorted_distinct(&column_series(ds.frame(), column)?)?,
        };

        tracing::debug!("One-hot encoding '{}' into {} columns", column, categories.len());
        for (idx, category) in categories.iter().enumerate() {
            indicators.push(
                when(
                    col(column.as_str())
                        .cast(DataType::String)
                        .eq(lit(category.as_str())),
                )
                .then(lit(1i32))
                .otherwise(lit(0i32))
                .alias(format!("{column}{DUMMY_SEPARATOR}{idx}")),
            );
        }
    }

    let encoded = ds
        .frame()
        .clone()
        .lazy()
        .with_columns(indicators)
        .collect()
        .context("Failed to one-hot encode")?;
    *ds.frame_mut() = encoded;

    if drop_original {
        ds.drop_columns(columns)?;
    }
    Ok(ds)
}

// ---------------------------------------------------------------------------
// choose_features / get_target
// ---------------------------------------------------------------------------

/// Keep the allow-listed columns, their indicator columns and the target.
///
/// Returns the reduced dataset and the names of the dropped columns.
pub fn choose_features(mut ds: Dataset, args: &ChooseFeatures) -> Result<(Dataset, Vec<String>)> {
    let mut dropped = Vec::new();

    if let Some(allowed) = &args.features_to_use {
        let (kept, removed): (Vec<String>, Vec<String>) =
            ds.column_names().into_iter().partition(|name| {
                allowed
                    .iter()
                    .any(|a| a == name || a == dummy_source(name))
                    || args.target.as_deref() == Some(name.as_str())
            });

        if !removed.is_empty() {
            tracing::info!("The following columns were not used as features: {}", removed.join(","));
        }
        ds.select(&kept)?;
        dropped = removed;
    }

    if let Some(path) = &args.save_path {
        let path = expand_path_template(path);
        save_df(ds.frame_mut(), &path)?;
        tracing::info!("Features saved to {}", path.display());
    }

    Ok((ds, dropped))
}

/// Extract the target column.
pub fn get_target(frame: &DataFrame, args: &GetTarget) -> Result<Series> {
    let target = column_series(frame, &args.target)?;

    if let Some(path) = &args.save_path {
        let path = expand_path_template(path);
        save_series(&target, &path)?;
        tracing::info!("Target '{}' saved to {}", args.target, path.display());
    }

    Ok(target)
}

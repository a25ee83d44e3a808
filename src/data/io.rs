use crate::data::source::CsvSource;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::utils::ensure_parent_dir;
use polars::prelude::*;
use std::path::Path;

/// Read a delimited file described by `source`.
///
/// A missing file fails fast with [`PipelineError::ResourceMissing`].
pub fn read_csv(source: &CsvSource) -> Result<DataFrame> {
    let path = source.path.as_path();
    if !path.is_file() {
        return Err(PipelineError::ResourceMissing(format!(
            "CSV file not found: {}",
            path.display()
        )));
    }

    let separator = u8::try_from(source.separator).map_err(|_| {
        PipelineError::Configuration(format!(
            "CSV separator must be a single-byte character, got '{}'",
            source.separator
        ))
    })?;

    let mut lf = LazyCsvReader::new(path)
        .with_infer_schema_length(Some(10000))
        .with_has_header(source.has_header)
        .with_separator(separator)
        .finish()
        .with_context(|| format!("Failed to scan CSV {}", path.display()))?;

    if let Some(usecols) = &source.usecols {
        tracing::debug!("Columns being read from csv: {}", usecols.join(","));
        lf = lf.select(usecols.iter().map(|c| col(c.as_str())).collect::<Vec<_>>());
    }

    let df = lf
        .collect()
        .with_context(|| format!("Failed to read CSV {}", path.display()))?;

    tracing::info!("Dataframe with {} rows loaded from {}", df.height(), path.display());
    Ok(df)
}

/// Write a dataset to CSV with a header row, creating parent directories.
pub fn save_df(df: &mut DataFrame, path: &Path) -> Result<()> {
    ensure_parent_dir(path)
        .with_context(|| format!("Failed to create output directory for {}", path.display()))?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    CsvWriter::new(file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("Failed to write CSV file {}", path.display()))?;

    tracing::debug!("{} rows written to {}", df.height(), path.display());
    Ok(())
}

/// Write a single column (e.g. a target vector or scores) to CSV.
pub fn save_series(series: &Series, path: &Path) -> Result<()> {
    let mut df = DataFrame::new(vec![Column::from(series.clone())])?;
    save_df(&mut df, path)
}

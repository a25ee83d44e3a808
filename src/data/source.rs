//! Data source configuration and dispatch.

use super::db::{DbClient, DbSettings};
use super::io::read_csv;
use super::sql::{format_sql, load_sql};
use crate::error::{PipelineError, Result, config_err};
use polars::prelude::DataFrame;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default location of the database settings file for query mode.
pub const DEFAULT_DBCONFIG: &str = "config/dbconfig.yml";

/// How data is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMethod {
    Csv,
    Query,
}

/// The `load_data` configuration block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadDataConfig {
    pub how: LoadMethod,

    #[serde(default)]
    pub csv: Option<CsvSource>,

    #[serde(default)]
    pub query: Option<QuerySource>,
}

/// Delimited-file source
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsvSource {
    pub path: PathBuf,

    /// Restrict (and order) the columns that are read
    #[serde(default)]
    pub usecols: Option<Vec<String>>,

    #[serde(default = "default_separator")]
    pub separator: char,

    #[serde(default = "default_true")]
    pub has_header: bool,
}

impl CsvSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            usecols: None,
            separator: default_separator(),
            has_header: true,
        }
    }
}

/// SQL source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySource {
    /// Inline SQL statement
    pub sql: Option<String>,

    /// File containing the SQL statement
    pub path_to_sql: Option<PathBuf>,

    /// Keep `--` comment lines from `path_to_sql`
    pub load_comments: bool,

    /// Values for `${var:NAME}` placeholders
    pub replace_sqlvar: BTreeMap<String, serde_yaml::Value>,

    /// Values for `{NAME}` placeholders
    pub replace_var: BTreeMap<String, serde_yaml::Value>,

    /// Inline connection settings
    pub db: Option<DbSettings>,

    /// YAML file with connection settings (used when `db` is absent)
    pub dbconfig: Option<PathBuf>,
}

impl QuerySource {
    fn validate(&self) -> Result<()> {
        match (&self.sql, &self.path_to_sql) {
            (Some(_), Some(_)) => config_err("only one of query.sql or query.path_to_sql may be given"),
            (None, None) => config_err("query.sql or query.path_to_sql must be given"),
            _ => Ok(()),
        }
    }

    /// The final SQL text with placeholders substituted.
    pub fn statement(&self) -> Result<String> {
        self.validate()?;
        let raw = if let Some(sql) = &self.sql {
            sql.clone()
        } else if let Some(path) = &self.path_to_sql {
            load_sql(path, self.load_comments)?
        } else {
            return config_err("query.sql or query.path_to_sql must be given");
        };
        Ok(format_sql(
            &raw,
            &scalar_map(&self.replace_sqlvar)?,
            &scalar_map(&self.replace_var)?,
        ))
    }

    fn db_settings(&self) -> Result<DbSettings> {
        if let Some(db) = &self.db {
            return Ok(db.clone());
        }
        let path = self
            .dbconfig
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DBCONFIG));
        DbSettings::from_file(&path)
    }
}

fn scalar_map(values: &BTreeMap<String, serde_yaml::Value>) -> Result<BTreeMap<String, String>> {
    values
        .iter()
        .map(|(k, v)| {
            crate::utils::yaml_scalar_to_string(v)
                .map(|s| (k.clone(), s))
                .ok_or_else(|| {
                    PipelineError::Configuration(format!("placeholder '{k}' must be a scalar value"))
                })
        })
        .collect()
}

fn default_separator() -> char {
    ','
}

fn default_true() -> bool {
    true
}

impl LoadDataConfig {
    /// csv mode reading `path`, as used by the `--csv` override
    pub fn from_csv_path(path: impl Into<PathBuf>) -> Self {
        Self {
            how: LoadMethod::Csv,
            csv: Some(CsvSource::from_path(path)),
            query: None,
        }
    }

    /// Exactly the parameters of the selected mode must be present.
    pub fn validate(&self) -> Result<()> {
        match self.how {
            LoadMethod::Csv => {
                if self.query.is_some() {
                    return config_err("load_data.how is 'csv' but query parameters were given");
                }
                if self.csv.is_none() {
                    return config_err("load_data.csv.path must be provided when how is 'csv'");
                }
                Ok(())
            }
            LoadMethod::Query => {
                if self.csv.is_some() {
                    return config_err("load_data.how is 'query' but csv parameters were given");
                }
                self.query
                    .as_ref()
                    .map_or_else(|| config_err("load_data.query must be provided when how is 'query'"), QuerySource::validate)
            }
        }
    }

    pub fn csv_path(&self) -> Option<&Path> {
        self.csv.as_ref().map(|c| c.path.as_path())
    }
}

/// Load a dataset from the configured source.
pub async fn load_data(config: &LoadDataConfig) -> Result<DataFrame> {
    config.validate()?;
    match (&config.csv, &config.query) {
        (Some(csv), None) => read_csv(csv),
        (None, Some(query)) => {
            let sql = query.statement()?;
            let settings = query.db_settings()?;
            let client = DbClient::connect(settings.connect_options()).await?;
            let df = client.fetch_dataframe(&sql).await?;
            tracing::info!("Dataframe with {} rows loaded from query", df.height());
            Ok(df)
        }
        _ => config_err("load_data must configure exactly one source"),
    }
}

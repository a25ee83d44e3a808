use crate::error::{PipelineError, Result};
use polars::prelude::*;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Deserializer};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column as _, Pool, Postgres, Row as _, TypeInfo as _};

/// Connection settings for the query data source.
///
/// Credentials not given inline are read from the environment variables
/// named by `user_env` / `password_env`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_password")]
    pub password: Option<SecretString>,
    pub user_env: String,
    pub password_env: String,
}

fn deserialize_password<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.map(|s| SecretString::new(s.into())))
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5432,
            database: String::new(),
            username: None,
            password: None,
            user_env: "STAGEHAND_DB_USER".to_owned(),
            password_env: "STAGEHAND_DB_PASSWORD".to_owned(),
        }
    }
}

impl DbSettings {
    /// Load settings from a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ResourceMissing(format!("database config {}: {e}", path.display()))
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    fn resolved_username(&self) -> Option<String> {
        self.username
            .clone()
            .or_else(|| std::env::var(&self.user_env).ok())
    }

    fn resolved_password(&self) -> Option<SecretString> {
        self.password.clone().or_else(|| {
            std::env::var(&self.password_env)
                .ok()
                .map(|p| SecretString::new(p.into()))
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let mut opts = PgConnectOptions::new().host(&self.host).port(self.port);
        if !self.database.is_empty() {
            opts = opts.database(&self.database);
        }
        if let Some(user) = self.resolved_username() {
            opts = opts.username(&user);
        }
        if let Some(password) = self.resolved_password() {
            opts = opts.password(password.expose_secret());
        }
        opts
    }
}

pub struct DbClient {
    pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn connect(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                PipelineError::ExternalTool(format!(
                    "Failed to connect to PostgreSQL (timeout after 10s): {e}"
                ))
            })?;
        Ok(Self { pool })
    }

    /// Run `sql` and materialize the result set column by column.
    pub async fn fetch_dataframe(&self, sql: &str) -> Result<DataFrame> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows_to_dataframe(&rows)
    }
}

fn collect_column<'r, T>(rows: &'r [PgRow], idx: usize) -> Result<Vec<Option<T>>>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    rows.iter()
        .map(|row| row.try_get::<Option<T>, _>(idx).map_err(PipelineError::from))
        .collect()
}

fn rows_to_dataframe(rows: &[PgRow]) -> Result<DataFrame> {
    let Some(first) = rows.first() else {
        return Ok(DataFrame::empty());
    };

    let mut columns = Vec::with_capacity(first.columns().len());
    for (idx, column) in first.columns().iter().enumerate() {
        let name = PlSmallStr::from(column.name());
        let sql_type = column.type_info().name().to_owned();

        let series = match sql_type.as_str() {
            "INT2" => Series::new(
                name,
                collect_column::<i16>(rows, idx)?
                    .into_iter()
                    .map(|v| v.map(i64::from))
                    .collect::<Vec<_>>(),
            ),
            "INT4" => Series::new(
                name,
                collect_column::<i32>(rows, idx)?
                    .into_iter()
                    .map(|v| v.map(i64::from))
                    .collect::<Vec<_>>(),
            ),
            "INT8" => Series::new(name, collect_column::<i64>(rows, idx)?),
            "FLOAT4" => Series::new(
                name,
                collect_column::<f32>(rows, idx)?
                    .into_iter()
                    .map(|v| v.map(f64::from))
                    .collect::<Vec<_>>(),
            ),
            "FLOAT8" => Series::new(name, collect_column::<f64>(rows, idx)?),
            "BOOL" => Series::new(name, collect_column::<bool>(rows, idx)?),
            _ => Series::new(
                name,
                collect_column::<String>(rows, idx).map_err(|e| {
                    PipelineError::ExternalTool(format!(
                        "column '{}' has unsupported type {sql_type}; cast it to text or a number in the query ({e})",
                        column.name()
                    ))
                })?,
            ),
        };
        columns.push(Column::from(series));
    }

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_settings_defaults_and_yaml() {
        let settings: DbSettings =
            serde_yaml::from_str("host: db.internal\ndatabase: warehouse\npassword: hunter2").unwrap();
        assert_eq!(settings.host, "db.internal");
        assert_eq!(settings.port, 5432);
        assert_eq!(settings.database, "warehouse");
        assert_eq!(
            settings.password.as_ref().map(|p| p.expose_secret().to_owned()),
            Some("hunter2".to_owned())
        );
        assert_eq!(settings.user_env, "STAGEHAND_DB_USER");
    }

    #[test]
    fn test_db_settings_rejects_unknown_keys() {
        let result: std::result::Result<DbSettings, _> = serde_yaml::from_str("hostname: x");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_result_set() {
        let df = rows_to_dataframe(&[]).unwrap();
        assert_eq!(df.height(), 0);
    }
}

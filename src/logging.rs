//! Logging infrastructure for stagehand
//!
//! Logs always go to the console. When a log directory is configured they are
//! additionally written to daily-rotating files:
//!
//! - `stagehand.<date>.log`: everything that passes the filter
//! - `error.<date>.log`: warnings and errors only (this includes harness verdicts)
//!
//! ## Usage
//!
//! ```no_run
//! use stagehand::logging::{self, LoggingConfig};
//!
//! // Initialize once at process start and keep the guard alive
//! let _guard = logging::init(&LoggingConfig::default()).expect("Failed to initialize logging");
//!
//! tracing::info!("Pipeline started");
//! ```

use crate::error::{PipelineError, Result, ResultExt as _};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Environment variable naming the log directory when `--log-dir` is absent.
pub const LOG_DIR_ENV: &str = "STAGEHAND_LOG_DIR";

const DEFAULT_FILTER: &str = "info";

/// Where and how much to log.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Filter directive (e.g. `debug`, `stagehand=trace`); `RUST_LOG` wins when set
    pub filter: Option<String>,

    /// Directory for rotating log files; console only when `None`
    pub log_dir: Option<PathBuf>,
}

/// Keeps the background file writers alive. Drop it last.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _workers: Vec<WorkerGuard>,
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directive)
        .map_err(|e| PipelineError::Configuration(format!("invalid log filter '{directive}': {e}")))
}

fn file_appender(dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| PipelineError::Other(format!("Failed to create {prefix} log appender: {e}")))
}

/// Initializes the logging system with console and optional file output
///
/// # Errors
///
/// Returns error if the filter is invalid, the log directory cannot be
/// created, or a subscriber is already installed
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let env_filter = build_filter(config)?;

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let mut workers = Vec::new();
    let (all_logs_layer, error_logs_layer) = if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let (all_writer, all_guard) = tracing_appender::non_blocking(file_appender(dir, "stagehand")?);
        let (error_writer, error_guard) = tracing_appender::non_blocking(file_appender(dir, "error")?);
        workers.push(all_guard);
        workers.push(error_guard);

        let all_logs_layer = fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(all_writer);

        let error_logs_layer = fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(error_writer)
            .with_filter(EnvFilter::new("warn"));

        (Some(all_logs_layer), Some(error_logs_layer))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .map_err(|e| PipelineError::Other(format!("Failed to install log subscriber: {e}")))?;

    if let Some(dir) = &config.log_dir {
        tracing::debug!("Logging initialized, log directory: {}", dir.display());
    }

    Ok(LoggingGuard { _workers: workers })
}

//! Centralized error handling for stagehand.
//!
//! ## Error categories
//!
//! Every fallible library operation returns [`Result`], whose error is a
//! [`PipelineError`]. The variants mirror how a failure should be treated:
//!
//! ```
//! use stagehand::error::PipelineError;
//!
//! fn describe(err: &PipelineError) -> &'static str {
//!     match err {
//!         PipelineError::Configuration(_) => "fix the YAML and rerun",
//!         PipelineError::ResourceMissing(_) => "an input file is absent",
//!         PipelineError::ExternalTool(_) => "a command or database failed",
//!         _ => "unexpected failure",
//!     }
//! }
//! ```
//!
//! Output mismatches found by the regression harness are deliberately *not*
//! errors: they are recorded in [`crate::harness::TestResult`] so that a
//! suite always runs to completion.
//!
//! ## Context
//!
//! The [`ResultExt`] trait adds `.context()` to any `Result` whose error
//! converts into [`PipelineError`]. Unlike a plain string wrapper, the
//! category survives, so a configuration error with context is still a
//! configuration error:
//!
//! ```no_run
//! use stagehand::error::{Result, ResultExt as _};
//!
//! fn read_config(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).context("Failed to read run configuration")
//! }
//! ```

use std::fmt;

/// Main error type for stagehand operations.
#[derive(Debug)]
pub enum PipelineError {
    /// Missing or contradictory configuration (unknown step, bad split sizes, ...)
    Configuration(String),

    /// A configured input file does not exist
    ResourceMissing(String),

    /// An external command exited non-zero, or the database failed
    ExternalTool(String),

    /// Dataset manipulation errors (polars, binning, shape mismatches)
    DataProcessing(String),

    /// Estimator construction or fitting errors
    Model(String),

    /// Encoding or decoding of persisted artifacts and dictionary-like files
    Serialization(String),

    /// I/O errors
    Io(std::io::Error),

    /// Generic error with context
    Other(String),
}

impl PipelineError {
    /// Prefix the message with `msg`, keeping the category.
    #[must_use]
    pub fn prefixed(self, msg: &str) -> Self {
        match self {
            Self::Configuration(m) => Self::Configuration(format!("{msg}: {m}")),
            Self::ResourceMissing(m) => Self::ResourceMissing(format!("{msg}: {m}")),
            Self::ExternalTool(m) => Self::ExternalTool(format!("{msg}: {m}")),
            Self::DataProcessing(m) => Self::DataProcessing(format!("{msg}: {m}")),
            Self::Model(m) => Self::Model(format!("{msg}: {m}")),
            Self::Serialization(m) => Self::Serialization(format!("{msg}: {m}")),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), format!("{msg}: {e}"))),
            Self::Other(m) => Self::Other(format!("{msg}: {m}")),
        }
    }

    /// Whether the failure is a configuration problem.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            Self::ResourceMissing(msg) => write!(f, "Resource missing: {msg}"),
            Self::ExternalTool(msg) => write!(f, "External tool error: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Model(msg) => write!(f, "Model error: {msg}"),
            Self::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration(format!("YAML error: {err}"))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {err}"))
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(format!("model blob: {err}"))
    }
}

impl From<quick_xml::Error> for PipelineError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Serialization(format!("XML error: {err}"))
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::ExternalTool(format!("database: {err}"))
    }
}

/// Result type alias for stagehand operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().prefixed(&msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().prefixed(&f()))
    }
}

/// Shorthand for building a [`PipelineError::Configuration`] result.
pub fn config_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(PipelineError::Configuration(msg.into()))
}

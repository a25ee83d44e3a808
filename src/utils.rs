//! Small helpers shared across stages.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A configuration value that may be written as a single item or a list.
///
/// `columns: age` and `columns: [age, income]` both deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v.clone()],
            Self::Many(vs) => vs.clone(),
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// Logs the elapsed time of a scope when dropped.
///
/// ```
/// use stagehand::utils::Timer;
///
/// {
///     let _timer = Timer::new("model training");
///     // ... work ...
/// } // logs "model training took 0.00 seconds"
/// ```
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        tracing::info!("{} took {:.2} seconds", self.label, self.elapsed_secs());
    }
}

/// Expand path template with variables (e.g., {date})
pub fn expand_path_template(template: &Path) -> PathBuf {
    let raw = template.to_string_lossy();
    if !raw.contains("{date}") {
        return template.to_path_buf();
    }
    let today = Local::now().format("%Y-%m-%d").to_string();
    PathBuf::from(raw.replace("{date}", &today))
}

/// Render a YAML scalar as the string it would print as.
///
/// Returns `None` for mappings, sequences and null.
pub fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
        serde_yaml::Value::Null | serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => {
            None
        }
    }
}

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

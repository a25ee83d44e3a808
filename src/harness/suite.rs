//! Test-suite configuration.
//!
//! ```yaml
//! features:
//!   command: stagehand generate_features --config test/features.yml --csv test/data.csv
//!   true_dir: test/true
//!   test_dir: test/output
//!   files_to_compare:
//!     - features.csv
//! ```

use crate::error::{PipelineError, Result, ResultExt as _};
use crate::utils::yaml_scalar_to_string;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One named regression test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,

    /// Whitespace-separated invocation; not passed through a shell
    pub command: String,

    /// Directory holding the golden outputs
    pub true_dir: PathBuf,

    /// Directory the command writes its outputs into
    pub test_dir: PathBuf,

    /// File names relative to both directories
    pub files_to_compare: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestCaseBody {
    command: String,
    true_dir: PathBuf,
    test_dir: PathBuf,
    #[serde(default)]
    files_to_compare: Vec<String>,
}

impl TestCase {
    pub fn golden_path(&self, file: &str) -> PathBuf {
        self.true_dir.join(file)
    }

    pub fn candidate_path(&self, file: &str) -> PathBuf {
        self.test_dir.join(file)
    }

    /// The command split into program and arguments.
    pub fn argv(&self) -> Result<(&str, Vec<&str>)> {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            PipelineError::Configuration(format!("test '{}' has an empty command", self.name))
        })?;
        Ok((program, parts.collect()))
    }
}

/// Test cases in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSuite {
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(text)?;

        let mut cases = Vec::with_capacity(mapping.len());
        for (key, body) in mapping {
            let name = yaml_scalar_to_string(&key).ok_or_else(|| {
                PipelineError::Configuration(format!("test names must be scalars, got {key:?}"))
            })?;
            let body: TestCaseBody = serde_yaml::from_value(body)
                .with_context(|| format!("Invalid definition for test '{name}'"))?;

            cases.push(TestCase {
                name,
                command: body.command,
                true_dir: body.true_dir,
                test_dir: body.test_dir,
                files_to_compare: body.files_to_compare,
            });
        }

        Ok(Self { cases })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::ResourceMissing(format!(
                "test configuration {} does not exist",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_keeps_declaration_order() {
        let suite = TestSuite::from_yaml(
            "zeta:\n  command: \"true\"\n  true_dir: t\n  test_dir: o\n  files_to_compare: [a.csv]\n\
             alpha:\n  command: cp a b\n  true_dir: t2\n  test_dir: o2\n  files_to_compare: [b.yml, c.csv]\n",
        )
        .unwrap();

        let names: Vec<&str> = suite.cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(suite.cases[1].files_to_compare, vec!["b.yml", "c.csv"]);
        assert_eq!(suite.cases[1].golden_path("b.yml"), PathBuf::from("t2/b.yml"));
        assert_eq!(suite.cases[1].candidate_path("b.yml"), PathBuf::from("o2/b.yml"));
    }

    #[test]
    fn test_argv_splits_on_whitespace() {
        let suite = TestSuite::from_yaml(
            "t1:\n  command: \"cp  src/a.csv\tout/a.csv\"\n  true_dir: t\n  test_dir: o\n",
        )
        .unwrap();
        let (program, args) = suite.cases[0].argv().unwrap();
        assert_eq!(program, "cp");
        assert_eq!(args, vec!["src/a.csv", "out/a.csv"]);
    }

    #[test]
    fn test_empty_command_rejected() {
        let suite =
            TestSuite::from_yaml("t1:\n  command: \"  \"\n  true_dir: t\n  test_dir: o\n").unwrap();
        assert!(suite.cases[0].argv().unwrap_err().is_configuration());
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = TestSuite::from_yaml("t1:\n  command: \"true\"\n  true_dir: t\n").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("t1"));
    }

    #[test]
    fn test_missing_suite_file() {
        let err = TestSuite::load(Path::new("no/such/test_config.yml")).unwrap_err();
        assert!(matches!(err, PipelineError::ResourceMissing(_)));
    }
}

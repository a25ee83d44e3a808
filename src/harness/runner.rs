//! Runs test cases and reconciles their outputs against golden files.

use super::compare::{compare_dict, debug_dump_path, dump_yaml, is_dictlike, load_dictlike};
use super::hasher::files_identical;
use super::suite::{TestCase, TestSuite};
use crate::error::{PipelineError, Result, ResultExt as _};
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Outcome of one test case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub passed: bool,

    /// Files that differ, were not produced, or have no golden copy
    pub mismatched_files: Vec<String>,
}

/// Outcome of a whole suite, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    pub all_passed: bool,
    pub results: Vec<(String, TestResult)>,
}

impl SuiteReport {
    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results
            .iter()
            .find(|(test, _)| test == name)
            .map(|(_, result)| result)
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, result)| !result.passed)
            .map(|(name, _)| name.as_str())
    }
}

/// Load the suite at `path` and run every test case in order.
pub async fn run_suite(path: &Path) -> Result<SuiteReport> {
    let suite = TestSuite::load(path)?;
    tracing::info!("Running {} test(s) from {}", suite.cases.len(), path.display());
    run_cases(&suite).await
}

/// Run test cases sequentially.
///
/// Mismatches are recorded, not raised, so every case runs. A command that
/// fails to start or exits non-zero aborts the suite.
pub async fn run_cases(suite: &TestSuite) -> Result<SuiteReport> {
    let mut report = SuiteReport {
        all_passed: true,
        results: Vec::with_capacity(suite.cases.len()),
    };

    for case in &suite.cases {
        let result = run_test(case).await?;
        if result.passed {
            tracing::warn!("{} test PASSED", case.name);
        } else {
            tracing::warn!(
                "{} file(s) does not match or did not exist, {} test FAILED",
                result.mismatched_files.join(", "),
                case.name
            );
            report.all_passed = false;
        }
        report.results.push((case.name.clone(), result));
    }

    if report.all_passed {
        tracing::warn!("Success, all tests passed!");
    }
    Ok(report)
}

/// Run one test case: clear stale outputs, run the command, compare.
pub async fn run_test(case: &TestCase) -> Result<TestResult> {
    let no_golden = prepare_outputs(case)?;

    run_command(case).await?;

    let (dict_files, plain_files): (Vec<&String>, Vec<&String>) = case
        .files_to_compare
        .iter()
        .filter(|file| !no_golden.contains(*file))
        .partition(|file| is_dictlike(file));

    let mut mismatched = Vec::new();
    for file in plain_files {
        if !plain_file_matches(case, file)? {
            mismatched.push(file.clone());
        }
    }
    mismatched.extend(no_golden);
    for file in dict_files {
        if !dict_file_matches(case, file)? {
            mismatched.push(file.clone());
        }
    }

    Ok(TestResult {
        passed: mismatched.is_empty(),
        mismatched_files: mismatched,
    })
}

/// Delete stale candidates and list the files that have no golden copy.
fn prepare_outputs(case: &TestCase) -> Result<Vec<String>> {
    let mut no_golden = Vec::new();
    for file in &case.files_to_compare {
        let candidate = case.candidate_path(file);
        if candidate.exists() {
            std::fs::remove_file(&candidate)
                .with_context(|| format!("Failed to remove {}", candidate.display()))?;
            tracing::debug!("{} removed to be recreated", candidate.display());
        }

        let golden = case.golden_path(file);
        if !golden.exists() {
            tracing::warn!("{} does not exist to be compared to", golden.display());
            no_golden.push(file.clone());
        }
    }
    Ok(no_golden)
}

async fn run_command(case: &TestCase) -> Result<()> {
    let (program, args) = case.argv()?;
    tracing::info!("Running test '{}': {}", case.name, case.command);

    let out = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            PipelineError::ExternalTool(format!("Failed to start '{}' for test '{}': {e}", case.command, case.name))
        })?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    if !stdout.trim().is_empty() {
        tracing::debug!("{}", stdout.trim_end());
    }

    if out.status.success() {
        Ok(())
    } else {
        Err(PipelineError::ExternalTool(format!(
            "'{}' exited with {} in test '{}': {}",
            case.command,
            out.status,
            case.name,
            String::from_utf8_lossy(&out.stderr).trim()
        )))
    }
}

fn plain_file_matches(case: &TestCase, file: &str) -> Result<bool> {
    let candidate = case.candidate_path(file);
    if !candidate.exists() {
        tracing::warn!("{} was not produced", candidate.display());
        return Ok(false);
    }
    files_identical(&case.golden_path(file), &candidate)
}

fn dict_file_matches(case: &TestCase, file: &str) -> Result<bool> {
    let candidate_path = case.candidate_path(file);
    if !candidate_path.exists() {
        tracing::warn!("{} was not produced", candidate_path.display());
        return Ok(false);
    }

    let golden = match load_dictlike(&case.golden_path(file)) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("Golden {file} could not be read: {err}");
            return Ok(false);
        }
    };
    // A malformed output is a failed comparison, not a failed suite.
    let candidate = match load_dictlike(&candidate_path) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("{err}");
            dump_yaml(&golden, &debug_dump_path(&case.true_dir, "true", file))?;
            return Ok(false);
        }
    };

    let mismatch_keys = compare_dict(&golden, &candidate);
    if mismatch_keys.is_empty() {
        return Ok(true);
    }

    dump_yaml(&golden, &debug_dump_path(&case.true_dir, "true", file))?;
    dump_yaml(&candidate, &debug_dump_path(&case.test_dir, "test", file))?;
    tracing::warn!("{} keys are not the same", mismatch_keys.join(","));
    Ok(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            for sub in ["src", "true", "out"] {
                std::fs::create_dir_all(dir.path().join(sub)).unwrap();
            }
            Self { dir }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn write(&self, rel: &str, contents: &str) {
            std::fs::write(self.path(rel), contents).unwrap();
        }

        fn case(&self, command: &str, files: &[&str]) -> TestCase {
            TestCase {
                name: "t1".to_owned(),
                command: command.to_owned(),
                true_dir: self.path("true"),
                test_dir: self.path("out"),
                files_to_compare: files.iter().map(|f| (*f).to_owned()).collect(),
            }
        }

        fn copy_command(&self, file: &str) -> String {
            format!(
                "cp {} {}",
                self.path(&format!("src/{file}")).display(),
                self.path(&format!("out/{file}")).display()
            )
        }
    }

    #[tokio::test]
    async fn test_identical_plain_file_passes() {
        let fx = Fixture::new();
        fx.write("src/out.csv", "a,b\n1,2\n");
        fx.write("true/out.csv", "a,b\n1,2\n");

        let result = run_test(&fx.case(&fx.copy_command("out.csv"), &["out.csv"]))
            .await
            .unwrap();
        assert!(result.passed);
        assert!(result.mismatched_files.is_empty());
    }

    #[tokio::test]
    async fn test_stale_output_is_removed() {
        let fx = Fixture::new();
        fx.write("true/out.csv", "a\n1\n");
        fx.write("out/out.csv", "a\n1\n");

        // `true` produces nothing, so the stale copy must not count
        let result = run_test(&fx.case("true", &["out.csv"])).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.mismatched_files, vec!["out.csv"]);
        assert!(!fx.path("out/out.csv").exists());
    }

    #[tokio::test]
    async fn test_missing_golden_is_mismatch() {
        let fx = Fixture::new();
        fx.write("src/new.csv", "x\n");

        let result = run_test(&fx.case(&fx.copy_command("new.csv"), &["new.csv"]))
            .await
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.mismatched_files, vec!["new.csv"]);
    }

    #[tokio::test]
    async fn test_dict_mismatch_writes_debug_dumps() {
        let fx = Fixture::new();
        fx.write("src/meta.yml", "model:\n  depth: 4\n");
        fx.write("true/meta.yml", "model:\n  depth: 3\n");

        let result = run_test(&fx.case(&fx.copy_command("meta.yml"), &["meta.yml"]))
            .await
            .unwrap();
        assert_eq!(result.mismatched_files, vec!["meta.yml"]);
        assert!(fx.path("true/true_meta.yml.yml").exists());
        assert!(fx.path("out/test_meta.yml.yml").exists());
    }

    #[tokio::test]
    async fn test_malformed_output_is_mismatch() {
        let fx = Fixture::new();
        fx.write("src/meta.json", r#"{"a": "#);
        fx.write("true/meta.json", r#"{"a": 1}"#);

        let result = run_test(&fx.case(&fx.copy_command("meta.json"), &["meta.json"]))
            .await
            .unwrap();
        assert!(!result.passed);
        assert_eq!(result.mismatched_files, vec!["meta.json"]);
        assert!(fx.path("true/true_meta.json.yml").exists());
    }

    #[tokio::test]
    async fn test_failing_command_is_error() {
        let fx = Fixture::new();
        let err = run_test(&fx.case("false", &[])).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExternalTool(_)));
    }

    #[tokio::test]
    async fn test_unknown_program_is_error() {
        let fx = Fixture::new();
        let err = run_test(&fx.case("stagehand-no-such-binary --flag", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExternalTool(_)));
    }

    #[tokio::test]
    async fn test_suite_report_keeps_every_case() {
        let fx = Fixture::new();
        fx.write("true/a.csv", "1\n");
        let mut failing = fx.case("true", &["a.csv"]);
        failing.name = "fails".to_owned();
        let mut passing = fx.case("true", &[]);
        passing.name = "passes".to_owned();

        let report = run_cases(&TestSuite {
            cases: vec![failing, passing],
        })
        .await
        .unwrap();

        assert!(!report.all_passed);
        assert_eq!(report.failed().collect::<Vec<_>>(), vec!["fails"]);
        assert!(report.result("passes").unwrap().passed);
    }
}

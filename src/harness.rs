//! Golden-file regression testing.
//!
//! A test suite is a YAML mapping of named test cases. Each case runs an
//! external command (usually the `stagehand` binary itself) and then checks
//! the files it wrote into `test_dir` against golden copies in `true_dir`.
//!
//! ## Comparison rules
//!
//! - Stale outputs are deleted before the command runs, so a test can only
//!   pass on files the command actually produced.
//! - Plain files must be byte-identical (size, then streamed SHA-256).
//! - `json`, `xml`, `yml` and `yaml` files are parsed and compared
//!   structurally: every key in the golden document must be present in the
//!   candidate with an equal value. Key order is ignored, list order is not.
//!   Keys that appear only in the candidate are not checked.
//! - A file with no golden copy is always a mismatch.
//!
//! When a structural comparison fails, both parsed documents are written
//! back out as `true_<file>.yml` and `test_<file>.yml` to make the diff easy
//! to inspect.
//!
//! Mismatches never abort the suite: they are collected into a
//! [`SuiteReport`]. A command that exits non-zero is an
//! [`ExternalTool`](crate::error::PipelineError::ExternalTool) error.
//!
//! ```no_run
//! # async fn example() -> stagehand::error::Result<()> {
//! let report = stagehand::harness::run_suite("test/test_config.yml".as_ref()).await?;
//! for name in report.failed() {
//!     tracing::error!("{name} failed");
//! }
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod hasher;
pub mod runner;
pub mod suite;

pub use compare::{compare_dict, is_dictlike, load_dictlike, xml_to_value};
pub use hasher::{compute_file_hash, files_identical};
pub use runner::{SuiteReport, TestResult, run_cases, run_suite, run_test};
pub use suite::{TestCase, TestSuite};

/// Suite used by the `test` subcommand when no `--path` is given.
pub const DEFAULT_SUITE_PATH: &str = "test/test_config.yml";

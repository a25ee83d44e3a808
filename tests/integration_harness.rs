//! Regression harness tests driving real external commands.
//!
//! The commands are ordinary shell utilities, so these only run on unix.

#![cfg(unix)]

use stagehand::error::PipelineError;
use stagehand::harness::run_suite;
use std::path::PathBuf;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        for sub in ["produced", "true", "out"] {
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

    /// `cp produced/<f>... out`, the stand-in for a pipeline run
    fn copy_command(&self, files: &[&str]) -> String {
        let sources: Vec<String> = files
            .iter()
            .map(|f| self.path(&format!("produced/{f}")).display().to_string())
            .collect();
        format!("cp {} {}", sources.join(" "), self.path("out").display())
    }

    fn suite(&self, tests: &[(&str, String, &[&str])]) -> PathBuf {
        let mut yaml = String::new();
        for (name, command, files) in tests {
            yaml.push_str(&format!(
                "{name}:\n  command: \"{command}\"\n  true_dir: {}\n  test_dir: {}\n  files_to_compare: [{}]\n",
                self.path("true").display(),
                self.path("out").display(),
                files.join(", ")
            ));
        }
        let path = self.path("test_config.yml");
        std::fs::write(&path, yaml).unwrap();
        path
    }
}

#[tokio::test]
async fn test_matching_outputs_pass() {
    let ws = Workspace::new();
    for dir in ["produced", "true"] {
        ws.write(&format!("{dir}/out.csv"), "id,score\n1,0.5\n2,0.7\n");
    }
    ws.write("produced/meta.yml", "model:\n  depth: 3\n  features: [a, b]\nrows: 2\n");
    // same document, different key order
    ws.write("true/meta.yml", "rows: 2\nmodel:\n  features: [a, b]\n  depth: 3\n");

    let files: &[&str] = &["out.csv", "meta.yml"];
    let suite = ws.suite(&[("t1", ws.copy_command(files), files)]);
    let report = run_suite(&suite).await.unwrap();

    assert!(report.all_passed);
    let result = report.result("t1").unwrap();
    assert!(result.passed);
    assert!(result.mismatched_files.is_empty());
    assert!(!ws.path("true/true_meta.yml.yml").exists());
}

#[tokio::test]
async fn test_differing_outputs_fail() {
    let ws = Workspace::new();
    ws.write("produced/out.csv", "id,score\n1,0.5\n2,0.9\n");
    ws.write("true/out.csv", "id,score\n1,0.5\n2,0.7\n");
    ws.write("produced/meta.yml", "model:\n  depth: 4\nrows: 2\n");
    ws.write("true/meta.yml", "model:\n  depth: 3\nrows: 2\n");

    let files: &[&str] = &["out.csv", "meta.yml"];
    let suite = ws.suite(&[("t1", ws.copy_command(files), files)]);
    let report = run_suite(&suite).await.unwrap();

    assert!(!report.all_passed);
    assert_eq!(
        report.result("t1").unwrap().mismatched_files,
        vec!["out.csv", "meta.yml"]
    );
    assert!(ws.path("true/true_meta.yml.yml").exists());
    assert!(ws.path("out/test_meta.yml.yml").exists());
}

#[tokio::test]
async fn test_missing_golden_fails_even_when_command_succeeds() {
    let ws = Workspace::new();
    ws.write("produced/out.csv", "a\n1\n");
    ws.write("true/out.csv", "a\n1\n");
    ws.write("produced/new.csv", "b\n2\n");

    let files: &[&str] = &["out.csv", "new.csv"];
    let suite = ws.suite(&[("t1", ws.copy_command(files), files)]);
    let report = run_suite(&suite).await.unwrap();

    let result = report.result("t1").unwrap();
    assert!(!result.passed);
    assert_eq!(result.mismatched_files, vec!["new.csv"]);
}

#[tokio::test]
async fn test_structural_rules() {
    let ws = Workspace::new();
    // extra candidate keys are ignored
    ws.write("produced/extra.json", r#"{"a": 1, "b": {"c": [1, 2]}, "new": true}"#);
    ws.write("true/extra.json", r#"{"b": {"c": [1, 2]}, "a": 1}"#);
    // list order is significant
    ws.write("produced/order.yaml", "features: [income, age]\n");
    ws.write("true/order.yaml", "features: [age, income]\n");
    // attribute and sibling order do not matter in XML
    ws.write("produced/model.xml", r#"<model b="2" a="1"><depth>3</depth><name>m</name></model>"#);
    ws.write("true/model.xml", r#"<model a="1" b="2"><name>m</name><depth>3</depth></model>"#);

    let files: &[&str] = &["extra.json", "order.yaml", "model.xml"];
    let suite = ws.suite(&[("structure", ws.copy_command(files), files)]);
    let report = run_suite(&suite).await.unwrap();

    assert_eq!(
        report.result("structure").unwrap().mismatched_files,
        vec!["order.yaml"]
    );
}

#[tokio::test]
async fn test_every_case_runs_in_declaration_order() {
    let ws = Workspace::new();
    ws.write("true/never.csv", "x\n");
    ws.write("produced/ok.csv", "y\n");
    ws.write("true/ok.csv", "y\n");

    let never: &[&str] = &["never.csv"];
    let ok: &[&str] = &["ok.csv"];
    let suite = ws.suite(&[
        ("first_fails", "true".to_owned(), never),
        ("second_passes", ws.copy_command(ok), ok),
    ]);
    let report = run_suite(&suite).await.unwrap();

    let names: Vec<&str> = report.results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["first_fails", "second_passes"]);
    assert!(!report.all_passed);
    assert_eq!(report.failed().collect::<Vec<_>>(), vec!["first_fails"]);
}

#[tokio::test]
async fn test_malformed_output_does_not_stop_the_suite() {
    let ws = Workspace::new();
    ws.write("produced/meta.json", r#"{"a": "#);
    ws.write("true/meta.json", r#"{"a": 1}"#);
    ws.write("produced/ok.csv", "y\n");
    ws.write("true/ok.csv", "y\n");

    let meta: &[&str] = &["meta.json"];
    let ok: &[&str] = &["ok.csv"];
    let suite = ws.suite(&[
        ("t1", ws.copy_command(meta), meta),
        ("t2", ws.copy_command(ok), ok),
    ]);
    let report = run_suite(&suite).await.unwrap();

    assert!(!report.all_passed);
    assert_eq!(report.result("t1").unwrap().mismatched_files, vec!["meta.json"]);
    assert!(report.result("t2").unwrap().passed);
}

#[tokio::test]
async fn test_failing_command_aborts_suite() {
    let ws = Workspace::new();
    let no_files: &[&str] = &[];
    let suite = ws.suite(&[("broken", "false".to_owned(), no_files)]);

    let err = run_suite(&suite).await.unwrap_err();
    assert!(matches!(err, PipelineError::ExternalTool(_)));
}

//! Integration test: the `labext-journal` maintenance binary.
//!
//! Runs the binary built by Cargo as a subprocess against scratch journals.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_labext-journal"))
}

fn run(journal: &Path, args: &[&str]) -> Output {
    Command::new(bin())
        .arg(journal)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .unwrap()
}

#[test]
fn compact_on_missing_journal_fails_without_creating_it() {
    let dir = TempDir::new().unwrap();
    let journal = dir.path().join("typo.tsv");

    let output = run(&journal, &["compact", "--force"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no journal at"));
    assert!(!journal.exists());
}

#[test]
fn compact_rewrites_existing_journal() {
    let dir = TempDir::new().unwrap();
    let journal = dir.path().join("labels.tsv");
    fs::write(&journal, "b\tY\na\tX\na\tZ\n").unwrap();

    let output = run(&journal, &["compact"]);
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&journal).unwrap(), "a\tZ\nb\tY\n");
}

#[test]
fn inspection_commands_leave_file_untouched() {
    let dir = TempDir::new().unwrap();
    let journal = dir.path().join("labels.tsv");
    let contents = "a\tX\na\tZ\nb\tY\nc\tpar";
    fs::write(&journal, contents).unwrap();

    let stats = run(&journal, &["stats"]);
    assert!(stats.status.success());
    let report: serde_json::Value = serde_json::from_slice(&stats.stdout).unwrap();
    assert_eq!(report["labels"], 2);
    assert_eq!(report["stats"]["truncated_tail"], true);

    let get = run(&journal, &["get", "a"]);
    assert_eq!(String::from_utf8_lossy(&get.stdout), "Z\n");
    assert!(!run(&journal, &["get", "c"]).status.success());

    assert_eq!(fs::read_to_string(&journal).unwrap(), contents);
}

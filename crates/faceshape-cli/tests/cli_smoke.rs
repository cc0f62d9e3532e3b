//! CLI binary smoke tests using assert_cmd.
//!
//! These tests exercise the compiled `faceshape` binary to verify that
//! argument parsing, help text, and error handling work end-to-end.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("faceshape").unwrap()
}

// ---------------------------------------------------------------------------
// Top-level
// ---------------------------------------------------------------------------

#[test]
fn no_args_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_flag() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("train"))
        .stdout(predicate::str::contains("scan"));
}

#[test]
fn version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("faceshape"));
}

#[test]
fn unknown_subcommand_errors() {
    cmd().arg("predict").assert().failure();
}

// ---------------------------------------------------------------------------
// train
// ---------------------------------------------------------------------------

#[test]
fn train_no_config_prints_template() {
    cmd()
        .arg("train")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"corpus_dir\""))
        .stdout(predicate::str::contains("\"c_values\""))
        .stderr(predicate::str::contains("No config file provided"));
}

#[test]
fn train_nonexistent_config_errors() {
    cmd()
        .args(["train", "/nonexistent/config.json"])
        .assert()
        .failure();
}

#[test]
fn train_missing_model_errors() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("round")).unwrap();
    cmd()
        .arg("train")
        .arg("--corpus")
        .arg(dir.path())
        .args(["--model", "/nonexistent/face_mesh.onnx"])
        .assert()
        .failure();
}

#[test]
fn scan_missing_face_box_model_errors() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("round")).unwrap();
    let model = dir.path().join("face_mesh.onnx");
    std::fs::File::create(&model).unwrap();
    cmd()
        .arg("scan")
        .arg("--corpus")
        .arg(dir.path())
        .arg("--model")
        .arg(&model)
        .args(["--face-model", "/nonexistent/scrfd.onnx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("face box model"));
}

#[test]
fn train_rejects_unknown_schema() {
    cmd()
        .args(["train", "--schema", "dlib-68"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dlib-68"));
}

#[test]
fn train_rejects_invalid_test_fraction() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("face_mesh.onnx");
    std::fs::write(&model, b"").unwrap();
    let config = dir.path().join("config.json");
    let json = serde_json::json!({
        "corpus_dir": dir.path(),
        "model_path": model,
        "test_fraction": 1.5,
    });
    std::fs::write(&config, json.to_string()).unwrap();

    cmd().arg("train").arg(&config).assert().failure();
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

#[test]
fn scan_no_config_prints_template() {
    cmd()
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"model_path\""))
        .stderr(predicate::str::contains("No config file provided"));
}

#[test]
fn scan_missing_corpus_errors() {
    cmd()
        .args(["scan", "--corpus", "/nonexistent/corpus"])
        .assert()
        .failure();
}

//! CLI smoke tests.

use assert_cmd::Command;
use tempfile::TempDir;

fn stub_path() -> String {
    env!("CARGO_BIN_EXE_stub-engine").to_string()
}

#[test]
fn runs_a_small_match() {
    let dir = TempDir::new().unwrap();
    let pgn = dir.path().join("out");

    let mut cmd = Command::cargo_bin("gauntlet").unwrap();
    cmd.args([
        "--rounds",
        "1",
        "--games",
        "2",
        "--pgn-out",
        pgn.to_str().unwrap(),
        "--engine",
        &format!("cmd={}", stub_path()),
        "name=alpha",
        "nodes=64",
        "--engine",
        &format!("cmd={}", stub_path()),
        "name=beta",
        "nodes=64",
    ]);

    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("Started game 1 of 2"));
    assert!(stdout.contains("Finished game"));
    assert!(stdout.contains("Score of alpha vs beta"));
    assert!(stdout.contains("Tournament finished"));

    let archive = std::fs::read_to_string(dir.path().join("out.pgn")).unwrap();
    assert_eq!(archive.matches("[Event ").count(), 2);
}

#[test]
fn a_single_engine_is_a_configuration_error() {
    let mut cmd = Command::cargo_bin("gauntlet").unwrap();
    cmd.args([
        "--engine",
        &format!("cmd={}", stub_path()),
        "name=lonely",
        "nodes=64",
    ]);
    cmd.assert().failure();
}

#[test]
fn unknown_output_mode_is_rejected() {
    let mut cmd = Command::cargo_bin("gauntlet").unwrap();
    cmd.args([
        "--output",
        "teletype",
        "--engine",
        &format!("cmd={}", stub_path()),
        "name=a",
        "nodes=64",
        "--engine",
        &format!("cmd={}", stub_path()),
        "name=b",
        "nodes=64",
    ]);
    cmd.assert().failure();
}

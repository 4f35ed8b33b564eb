use std::path::{Path, PathBuf};
use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tokenizer-smoke"))
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn runs_init_encode_free_sequence() {
    let output = bin()
        .arg("--config")
        .arg(fixture("tokenizer.json"))
        .args(["--expect", "1,7,23,42"])
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Token count = 4"));
    assert!(stdout.contains("IDs: 1 7 23 42"));
    assert!(stdout.contains("free_ids"));
    assert!(stdout.contains("SMOKE TEST SUCCESS"));
}

#[test]
fn missing_config_fails() {
    let output = bin()
        .args(["--config", "/nonexistent/tokenizer.json"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("init_tokenizer FAILED"));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("encode_to_ids"));
}

#[test]
fn mismatched_expectation_fails() {
    let output = bin()
        .arg("--config")
        .arg(fixture("tokenizer.json"))
        .args(["--expect", "1,2,3"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected ids"));
}

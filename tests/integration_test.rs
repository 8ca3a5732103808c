//! Integration tests for the advisor-council binary

use std::process::Command;

fn advisor_council() -> Command {
    Command::new(env!("CARGO_BIN_EXE_advisor-council"))
}

#[test]
fn test_help_command() {
    let output = advisor_council()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--prompt"));
    assert!(stdout.contains("--context"));
    assert!(stdout.contains("--phase"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_version_command() {
    let output = advisor_council()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("advisor-council"));
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_prompt_is_required() {
    let output = advisor_council()
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--prompt"));
}

#[test]
fn test_unknown_phase_is_rejected() {
    let output = advisor_council()
        .args(["--prompt", "hi", "--phase", "brainstorm"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

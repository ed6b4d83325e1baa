//! CLI integration tests.
//!
//! These run the built binary. None of them starts a language server.

use std::process::Command;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lspbridge"))
}

#[test]
fn test_version_flag() {
    let output = binary()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lspbridge"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    let output = binary()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--workspace"));
    assert!(stdout.contains("--lsp"));
    assert!(stdout.contains("--log-file"));
    assert!(stdout.contains("--context-lines"));
}

#[test]
fn test_workspace_is_required() {
    let output = binary().output().expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--workspace"));
}

#[test]
fn test_missing_lsp_command_fails_before_serving() {
    let dir = tempfile::tempdir().unwrap();
    let output = binary()
        .arg("--workspace")
        .arg(dir.path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No language server configured"));
    assert!(output.stdout.is_empty());
}

//! CLI smoke tests
//!
//! Run the compiled binary on paths that exit before touching USB or the
//! terminal.

use std::fs;
use std::process::Command;

fn run_cli(args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_uvc-autoctl");
    let output = Command::new(bin)
        .args(args)
        .env("RUST_LOG", "")
        .env_remove("NOTIFY_SOCKET")
        .output()
        .expect("failed to execute uvc-autoctl binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

#[test]
fn cli_help_lists_modes() {
    let (code, stdout, _stderr) = run_cli(&["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("--service"));
    assert!(stdout.contains("--list-devices"));
    assert!(stdout.contains("--save-config"));
}

#[test]
fn cli_version() {
    let (code, stdout, _stderr) = run_cli(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("uvc-autoctl"));
}

#[test]
fn cli_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let (code, _stdout, stderr) = run_cli(&["--service", "--config", path.to_str().unwrap()]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Failed to load configuration"));
}

#[test]
fn cli_invalid_filter_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.toml");
    fs::write(&path, "[device]\nfilter = \"03e7:2485\"\n").unwrap();

    let (code, _stdout, stderr) = run_cli(&["--service", "--config", path.to_str().unwrap()]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Invalid device filter"));
}

#[test]
fn cli_invalid_log_level_override_fails() {
    let (code, _stdout, stderr) = run_cli(&["--service", "--log-level", "loud"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Invalid log level"));
}

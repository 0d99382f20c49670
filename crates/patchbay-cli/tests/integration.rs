//! Integration tests for the `patchbay` binary.
//!
//! Every test drives the prompt through stdin against the mock backend, so
//! no audio hardware is needed.

use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

/// Run `patchbay --backend mock` with `script` on stdin.
fn run_session(script: &str) -> Output {
    run_session_bytes(script.as_bytes())
}

fn run_session_bytes(script: &[u8]) -> Output {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "retry_backoff_ms = 1").unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_patchbay"))
        .args(["--backend", "mock", "--stop-timeout-ms", "1000", "--config"])
        .arg(config.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run patchbay");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(script)
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn startup_lists_devices() {
    let output = run_session("exit\n");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Audio Routing System"));
    assert!(stdout.contains("Available Input Devices:\n[0] Device 0: Built-in Microphone"));
    assert!(stdout.contains("[1] Device 1: USB Audio Interface\n    Channels: 2, Sample Rate: 48000.0"));
    assert!(stdout.contains("Available Output Devices:\n[0] Device 1: USB Audio Interface"));
    // Secondary host API is filtered out.
    assert!(!stdout.contains("Virtual Cable"));
    assert!(stdout.trim_end().ends_with("Program exited"), "stdout:\n{stdout}");
}

#[test]
fn create_list_and_stop_route() {
    let output = run_session("create 0 1\nroutes\nstop 1\nroutes\nexit\n");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        stdout.contains("Route 1 created: Device 0 (1 ch) → Device 2 (2 ch)"),
        "stdout:\n{stdout}"
    );
    assert!(stdout.contains("Active Routes:\nRoute 1: Device 0 (1 ch) → Device 2 (2 ch)"));
    assert!(stdout.contains("Route 1 removed"));
    assert!(stdout.contains("No active routes"));
}

#[test]
fn errors_keep_the_prompt_alive() {
    let output = run_session("create 9 9\nstop 5\nfrobnicate\ncreate x 1\nroutes\nexit\n");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains(
        "Enter command: Invalid device index. Please check available devices with 'list' command."
    ));
    assert!(!stdout.contains("Error: Invalid device index"));
    assert!(stdout.contains("Error: Route 5 doesn't exist"));
    assert!(stdout.contains("Invalid command. Try again or type 'exit' to quit."));
    assert!(stdout.contains("Error: invalid value 'x'"));
    assert!(stdout.contains("No active routes"));
}

#[test]
fn end_of_input_closes_running_routes() {
    let output = run_session("create 1 0 48000\n");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Route 1 created: Device 1 (2 ch) → Device 1 (2 ch)"));
    assert!(stdout.contains("Audio router closed"));
    assert!(stdout.trim_end().ends_with("Program exited"));
}

#[test]
fn invalid_utf8_input_is_just_a_bad_command() {
    let output = run_session_bytes(b"create 0 1\n\xff\xfe\nroutes\nexit\n");
    assert!(output.status.success(), "status: {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("Invalid command. Try again or type 'exit' to quit."));
    assert!(stdout.contains("Active Routes:\nRoute 1: Device 0 (1 ch) → Device 2 (2 ch)"));
    assert!(stdout.contains("Audio router closed"));
    assert!(stdout.trim_end().ends_with("Program exited"));
}

#[test]
fn quit_alias_exits() {
    let output = run_session("quit\nroutes\n");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("No active routes"));
}

#[test]
fn bad_config_fails_fast() {
    let mut config = NamedTempFile::new().unwrap();
    writeln!(config, "chunk_size = 0").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_patchbay"))
        .args(["--backend", "mock", "--config"])
        .arg(config.path())
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("chunk_size"), "stderr:\n{stderr}");
}

/// Regression tests for the driver binaries
///
/// Exit codes are part of the scripting contract:
/// - 0 when every step or iteration succeeds
/// - 1 when a step, iteration or the configuration fails
/// - 2 on usage errors

use sdls_harness::engine::frame::build_tc_frame;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(bin: &str, args: &[&str]) -> Output {
    Command::new(bin)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to spawn driver")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn write_tc_frame(dir: &Path) -> String {
    let path = dir.join("tc.bin");
    fs::write(&path, build_tc_frame(0, 0x2C, 1, None, b"driver payload")).unwrap();
    path.to_string_lossy().into_owned()
}

const SEQUENCE: &str = env!("CARGO_BIN_EXE_crypto_sequence");
const PERFORMANCE: &str = env!("CARGO_BIN_EXE_performance_test");
const APPLY: &str = env!("CARGO_BIN_EXE_apply_security");

#[test]
fn test_sequence_success_exits_zero() {
    let dir = TempDir::new().unwrap();
    let frame = write_tc_frame(dir.path());

    let output = run(SEQUENCE, &["--no-color", "tc_a", &frame, "tc_a", &frame]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("✓ [1] tc_a"));
    assert!(text.contains("✓ [2] tc_a"));
    assert!(text.contains("State: COMPLETED"));
}

#[test]
fn test_sequence_not_implemented_exits_one() {
    let dir = TempDir::new().unwrap();
    let frame = write_tc_frame(dir.path());

    let output = run(SEQUENCE, &["--no-color", "tm_a", &frame, "tc_a", &frame]);
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("TM_APPLY is not implemented"));
    assert!(text.contains("✓ [2] tc_a"));
}

#[test]
fn test_sequence_usage_errors_exit_two() {
    let output = run(SEQUENCE, &["tc_a", "a.bin", "tc_p"]);
    assert_eq!(output.status.code(), Some(2));

    let output = run(SEQUENCE, &["tc_x", "a.bin"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("unknown operation"));

    let output = run(SEQUENCE, &[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_sequence_continues_past_engine_failure_by_default() {
    let dir = TempDir::new().unwrap();
    let frame = write_tc_frame(dir.path());

    let output = run(SEQUENCE, &["--no-color", "tc_p", &frame, "tc_a", &frame]);
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("✗ [1] tc_p"));
    assert!(text.contains("✓ [2] tc_a"));
    assert!(text.contains("State: COMPLETED"));

    let output = run(
        SEQUENCE,
        &["--no-color", "--stop-on-error", "tc_p", &frame, "tc_a", &frame],
    );
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(!text.contains("[2] tc_a"));
    assert!(text.contains("State: ABORTED"));
    assert!(text.contains("Not executed: 1"));
}

#[test]
fn test_performance_requires_frame() {
    let output = run(PERFORMANCE, &["--inmemory", "--libgcrypt"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_performance_zero_loops_rejected_before_engine_runs() {
    let output = run(
        PERFORMANCE,
        &["--inmemory", "--libgcrypt", "--numloops", "0", "--frame", "2003"],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("--numloops"));
    assert!(!stdout(&output).contains("SADB TYPE"));
    assert!(!stdout(&output).contains("PERFORMANCE DATA"));
}

#[test]
fn test_performance_missing_hosts_is_reported() {
    let output = run(PERFORMANCE, &["--frame", "2003"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("sql_host"));
}

#[test]
fn test_performance_run_writes_exports() {
    let dir = TempDir::new().unwrap();
    let json = dir.path().join("summary.json");
    let csv = dir.path().join("samples.csv");
    let frame = hex::encode_upper(build_tc_frame(0, 0x2C, 1, None, &[0x11; 32]));

    let output = run(
        PERFORMANCE,
        &[
            "--inmemory",
            "--libgcrypt",
            "--no-color",
            "--numloops",
            "25",
            "--frame",
            &frame,
            "--json",
            json.to_str().unwrap(),
            "--csv",
            csv.to_str().unwrap(),
        ],
    );
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("SADB TYPE: INMEMORY"));
    assert!(text.contains("TC Method: TC_APPLY"));
    assert!(text.contains("Number of Frames Sent: 25"));

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(summary["count"], 25);
    assert_eq!(summary["successful"], 25);

    let samples = fs::read_to_string(&csv).unwrap();
    assert!(samples.starts_with("iteration,elapsed_us,success,bytes\n"));
    assert_eq!(samples.lines().count(), 26);
}

#[test]
fn test_performance_process_of_plain_frame_fails() {
    let frame = hex::encode_upper(build_tc_frame(0, 0x2C, 1, None, &[0x11; 32]));
    let output = run(
        PERFORMANCE,
        &[
            "--inmemory",
            "--libgcrypt",
            "--no-color",
            "--tc_process",
            "--numloops",
            "10",
            "--frame",
            &frame,
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    let text = stdout(&output);
    assert!(text.contains("TC Method: TC_PROCESS"));
    assert!(text.contains("on iteration 1 of 10"));
}

#[test]
fn test_apply_security_driver() {
    let dir = TempDir::new().unwrap();
    let frame = write_tc_frame(dir.path());

    let output = run(APPLY, &["--no-color", "tc", &frame]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("TC_APPLY"));

    let output = run(APPLY, &["--no-color", "aos", &frame]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("AOS_APPLY is not implemented"));

    let output = run(APPLY, &["tc"]);
    assert_eq!(output.status.code(), Some(2));
}

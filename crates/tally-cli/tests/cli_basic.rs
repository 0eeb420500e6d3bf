//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_tally"))
        .args(args)
        .env("TALLY_DATA_DIR", data_dir)
        .env_remove("TALLY_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_cli_success(data_dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "CLI command {args:?} failed: {stderr}");
    stdout
}

#[test]
fn test_checkin_shows_up_in_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_cli_success(dir.path(), &["checkin", "api", "auth", "first pass"]);
    assert!(out.contains("api / auth"), "unexpected output: {out}");

    let json = run_cli_success(
        dir.path(),
        &["report", "--since", "2000-01-01T00:00:00Z", "--json"],
    );
    let report: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(report["projects"][0]["name"], "api");
    assert_eq!(report["projects"][0]["tasks"][0]["name"], "auth");
    assert_eq!(
        report["projects"][0]["tasks"][0]["entries"][0]["notes"],
        "first pass"
    );
}

#[test]
fn test_checkin_rejects_blank_project() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["checkin", "  ", "auth"]);
    assert_eq!(code, 1);
    assert!(stderr.starts_with("error:"));

    let (projects, _, _) = run_cli(dir.path(), &["projects"]);
    assert!(projects.trim().is_empty());
}

#[test]
fn test_projects_and_tasks_by_prefix() {
    let dir = tempfile::tempdir().unwrap();
    run_cli_success(dir.path(), &["checkin", "P1", "design"]);
    run_cli_success(dir.path(), &["checkin", "Q1", "triage"]);
    run_cli_success(dir.path(), &["checkin", "P2", "deploy"]);

    let projects = run_cli_success(dir.path(), &["projects", "--prefix", "P"]);
    let mut listed: Vec<&str> = projects.lines().collect();
    listed.sort_unstable();
    assert_eq!(listed, vec!["P1", "P2"]);

    let tasks = run_cli_success(dir.path(), &["tasks", "P1"]);
    assert_eq!(tasks.lines().collect::<Vec<_>>(), vec!["design"]);
}

#[test]
fn test_break_and_skip() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_cli_success(dir.path(), &["break"]);
    assert!(out.starts_with("break"));
    let out = run_cli_success(dir.path(), &["skip"]);
    assert!(out.starts_with("skipped"));

    // Breaks never show up as a project.
    let projects = run_cli_success(dir.path(), &["projects"]);
    assert!(projects.trim().is_empty());
}

#[test]
fn test_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_cli_success(dir.path(), &["report"]);
    assert_eq!(out, "No entries.\n");
}

#[test]
fn test_status_json() {
    let dir = tempfile::tempdir().unwrap();
    let json = run_cli_success(dir.path(), &["status", "--json"]);
    let status: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(status["elapsed_seconds"].as_i64().unwrap() >= 0);
    assert!(status["snooze"]["extra"].as_array().unwrap().len() == 3);
}

#[test]
fn test_config_set_get() {
    let dir = tempfile::tempdir().unwrap();
    run_cli_success(dir.path(), &["config", "set", "reminders.interval_minutes", "25"]);
    let value = run_cli_success(dir.path(), &["config", "get", "reminders.interval_minutes"]);
    assert_eq!(value.trim(), "25");

    let list = run_cli_success(dir.path(), &["config", "list"]);
    assert!(list.contains("reminders.interval_minutes = 25"));
}

#[test]
fn test_config_rejects_bad_values() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(dir.path(), &["config", "set", "reminders.jitter_minutes", "60"]);
    assert_eq!(code, 1);
    let (_, _, code) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);

    let value = run_cli_success(dir.path(), &["config", "get", "reminders.jitter_minutes"]);
    assert_eq!(value.trim(), "2");
}

#[test]
fn test_report_rejects_bad_since() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(dir.path(), &["report", "--since", "yesterday"]);
    assert_ne!(code, 0);
}

/// Start `tally watch` with stdin held open and wait for its banner.
fn spawn_watch(data_dir: &Path) -> Child {
    let mut child = Command::new(env!("CARGO_BIN_EXE_tally"))
        .arg("watch")
        .env("TALLY_DATA_DIR", data_dir)
        .env_remove("TALLY_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start watch");

    let stdout = child.stdout.take().unwrap();
    let mut banner = String::new();
    BufReader::new(stdout).read_line(&mut banner).unwrap();
    assert!(banner.starts_with("watching"), "unexpected banner: {banner}");
    child
}

fn wait_for_exit(child: &mut Child, limit: Duration) -> Option<std::process::ExitStatus> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    None
}

#[cfg(unix)]
#[test]
fn test_watch_stops_on_interrupt_while_input_is_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = spawn_watch(dir.path());
    let _stdin = child.stdin.take();
    // Let the control loop install its Ctrl-C handler.
    std::thread::sleep(Duration::from_millis(500));

    let sent = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let status = wait_for_exit(&mut child, Duration::from_secs(5));
    assert!(
        status.is_some_and(|s| s.success()),
        "watch did not shut down after SIGINT: {status:?}"
    );
}

#[test]
fn test_watch_quits_when_input_closes() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = spawn_watch(dir.path());
    drop(child.stdin.take());

    let status = wait_for_exit(&mut child, Duration::from_secs(5));
    assert!(status.is_some_and(|s| s.success()), "watch kept running: {status:?}");
}

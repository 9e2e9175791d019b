//! Tests for the subprocess transport, run against fake CLI scripts.

#![cfg(unix)]

use claude_code_sdk::_internal::transport::build_command_args;
use claude_code_sdk::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SYSTEM: &str = r#"{"type":"system","subtype":"init","session_id":"fake"}"#;
const ASSISTANT: &str =
    r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}],"model":"fake"}}"#;
const RESULT: &str = r#"{"type":"result","subtype":"success","session_id":"fake","duration_ms":5,"duration_api_ms":3,"is_error":false,"num_turns":1}"#;

/// Write an executable shell script standing in for the CLI.
fn fake_cli(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("claude");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn options_for(dir: &TempDir, cli: &Path) -> ClaudeCodeOptions {
    ClaudeCodeOptions::new()
        .with_cli_path(cli)
        .with_env("FAKE_DIR", dir.path().display().to_string())
}

fn read_pid(dir: &TempDir) -> libc::pid_t {
    std::fs::read_to_string(dir.path().join("pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

fn process_exists(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only checks that the pid exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

// ============================================================================
// Successful Runs
// ============================================================================

#[tokio::test]
async fn test_fake_cli_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = dir.path().join("work");
    std::fs::create_dir(&workdir).unwrap();

    let cli = fake_cli(
        dir.path(),
        &format!(
            r#"printf '%s\n' "$@" > "$FAKE_DIR/args"
echo "$CLAUDE_CODE_ENTRYPOINT" > "$FAKE_DIR/entrypoint"
pwd -P > "$FAKE_DIR/cwd"
echo spawned >> "$FAKE_DIR/spawns"
read -r line
printf '%s\n' "$line" > "$FAKE_DIR/prompt"
echo '{SYSTEM}'
echo '{ASSISTANT}'
echo '{RESULT}'"#
        ),
    );

    let options = options_for(&dir, &cli)
        .with_max_turns(2)
        .with_allowed_tools(vec!["Read".into(), "Grep".into()])
        .with_permission_mode(PermissionMode::Plan)
        .with_cwd(&workdir);
    let expected_args = build_command_args(&options);

    let mut stream = query(&CancellationToken::new(), "What is 2 + 2?", Some(options))
        .await
        .unwrap();

    let mut messages = Vec::new();
    while let Some(item) = stream.next().await {
        messages.push(item.unwrap());
    }
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].as_assistant().unwrap().text(), "hi");
    assert!(messages[2].is_result());

    let args: Vec<String> = std::fs::read_to_string(dir.path().join("args"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(args, expected_args);

    let entrypoint = std::fs::read_to_string(dir.path().join("entrypoint")).unwrap();
    assert_eq!(entrypoint.trim(), "sdk-rust");

    let cwd = std::fs::read_to_string(dir.path().join("cwd")).unwrap();
    assert_eq!(
        PathBuf::from(cwd.trim()),
        workdir.canonicalize().unwrap()
    );

    let prompt: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("prompt")).unwrap())
            .unwrap();
    assert_eq!(prompt["message"]["content"], "What is 2 + 2?");

    let spawns = std::fs::read_to_string(dir.path().join("spawns")).unwrap();
    assert_eq!(spawns.lines().count(), 1, "one process per query");
}

#[tokio::test]
async fn test_fake_cli_output_after_result_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(
        dir.path(),
        &format!("read -r _prompt\necho '{RESULT}'\necho 'trailing noise'\necho '{ASSISTANT}'"),
    );

    let mut stream = query(&CancellationToken::new(), "hi", Some(options_for(&dir, &cli)))
        .await
        .unwrap();

    assert!(stream.next().await.unwrap().unwrap().is_result());
    assert!(stream.next().await.is_none());
}

// ============================================================================
// Abnormal Exit
// ============================================================================

#[tokio::test]
async fn test_fake_cli_exit_without_result_reports_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(
        dir.path(),
        &format!("read -r _prompt\necho '{ASSISTANT}'\necho 'authentication failed' >&2\nexit 3"),
    );

    let mut stream = query(&CancellationToken::new(), "hi", Some(options_for(&dir, &cli)))
        .await
        .unwrap();

    assert!(stream.next().await.unwrap().unwrap().is_assistant());
    match stream.next().await {
        Some(Err(ClaudeCodeError::PrematureClose {
            detail: Some(detail),
        })) => {
            assert!(detail.contains("code 3"), "detail was {}", detail);
            assert!(detail.contains("authentication failed"), "detail was {}", detail);
        }
        other => panic!("expected PrematureClose, got {:?}", other),
    }
    assert!(stream.next().await.is_none());
}

// ============================================================================
// Cancellation and Teardown
// ============================================================================

#[tokio::test]
async fn test_cancel_terminates_blocked_cli() {
    let dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(
        dir.path(),
        &format!("read -r _prompt\necho $$ > \"$FAKE_DIR/pid\"\necho '{SYSTEM}'\nexec sleep 3600"),
    );

    let cancel = CancellationToken::new();
    let mut stream = query(&cancel, "hi", Some(options_for(&dir, &cli)))
        .await
        .unwrap();

    assert!(stream.next().await.unwrap().is_ok());
    let pid = read_pid(&dir);
    assert!(process_exists(pid));

    cancel.cancel();
    let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap();
    assert!(matches!(item, Some(Err(ClaudeCodeError::Cancelled))));

    stream.close().await.unwrap();
    assert!(!process_exists(pid), "CLI process should be gone");
}

#[tokio::test]
async fn test_cli_ignoring_sigterm_is_killed_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(
        dir.path(),
        &format!(
            "trap '' TERM\nread -r _prompt\necho $$ > \"$FAKE_DIR/pid\"\necho '{SYSTEM}'\nwhile :; do sleep 1; done"
        ),
    );

    let options = options_for(&dir, &cli).with_close_timeout(Duration::from_millis(200));
    let cancel = CancellationToken::new();
    let mut stream = query(&cancel, "hi", Some(options)).await.unwrap();

    assert!(stream.next().await.unwrap().is_ok());
    let pid = read_pid(&dir);

    let started = Instant::now();
    cancel.cancel();
    stream.close().await.unwrap();

    assert!(!process_exists(pid), "CLI process should be killed");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_exit_after_stdout_closed() {
    let dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(
        dir.path(),
        &format!(
            "read -r _prompt\necho $$ > \"$FAKE_DIR/pid\"\necho '{SYSTEM}'\nexec 1>&-\nexec sleep 3600"
        ),
    );

    // Long enough that waiting it out would fail the elapsed check below.
    let options = options_for(&dir, &cli).with_close_timeout(Duration::from_secs(10));
    let cancel = CancellationToken::new();
    let mut stream = query(&cancel, "hi", Some(options)).await.unwrap();

    assert!(stream.next().await.unwrap().is_ok());
    let pid = read_pid(&dir);

    // Let the reader see EOF and start waiting on the still-running CLI.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    cancel.cancel();
    assert!(matches!(
        stream.next().await,
        Some(Err(ClaudeCodeError::Cancelled))
    ));
    stream.close().await.unwrap();

    assert!(!process_exists(pid), "CLI process should be gone");
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "teardown waited {:?} after cancel",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_dropping_stream_terminates_cli() {
    let dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(
        dir.path(),
        &format!("read -r _prompt\necho $$ > \"$FAKE_DIR/pid\"\necho '{SYSTEM}'\nexec sleep 3600"),
    );

    let mut stream = query(&CancellationToken::new(), "hi", Some(options_for(&dir, &cli)))
        .await
        .unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    let pid = read_pid(&dir);

    drop(stream);

    let deadline = Instant::now() + Duration::from_secs(5);
    while process_exists(pid) {
        assert!(Instant::now() < deadline, "CLI process outlived its stream");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ============================================================================
// Startup Failures
// ============================================================================

#[tokio::test]
async fn test_missing_cli_is_startup_error() {
    let options = ClaudeCodeOptions::new().with_cli_path("/definitely/not/here/claude");
    let err = query(&CancellationToken::new(), "hi", Some(options))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ClaudeCodeError::CliNotFound { .. }));
    assert!(err.is_startup_error());
}

#[tokio::test]
async fn test_non_executable_cli_is_startup_error() {
    let dir = tempfile::tempdir().unwrap();
    let cli = dir.path().join("claude");
    std::fs::write(&cli, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&cli, std::fs::Permissions::from_mode(0o644)).unwrap();

    let err = query(
        &CancellationToken::new(),
        "hi",
        Some(ClaudeCodeOptions::new().with_cli_path(&cli)),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(err, ClaudeCodeError::Startup { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_missing_cwd_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(dir.path(), &format!("echo '{RESULT}'"));

    let options = options_for(&dir, &cli).with_cwd(dir.path().join("missing"));
    let err = query(&CancellationToken::new(), "hi", Some(options))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ClaudeCodeError::Configuration { .. }));
}

#[tokio::test]
async fn test_check_cli_version_against_fake_cli() {
    let dir = tempfile::tempdir().unwrap();
    let cli = fake_cli(dir.path(), "echo '1.0.0 (Claude Code)'");

    let version = check_cli_version(Some(&cli)).await.unwrap();
    assert_eq!(version, "1.0.0");
}

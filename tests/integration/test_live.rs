//! One-shot queries against the installed CLI.

#![cfg(feature = "integration-tests")]

use claude_code_sdk::{
    check_cli_version, query, CancellationToken, ClaudeCodeError, ClaudeCodeOptions, Message,
    PermissionMode,
};
use futures::StreamExt;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Collect assistant text and the result of a finished query.
async fn run(prompt: &str, options: ClaudeCodeOptions) -> (String, claude_code_sdk::ResultMessage) {
    let mut stream = query(&CancellationToken::new(), prompt, Some(options))
        .await
        .expect("Failed to start query");

    let mut text = String::new();
    while let Some(message) = stream.next().await {
        match message.expect("Stream failed") {
            Message::Assistant(msg) => text.push_str(&msg.text()),
            Message::Result(result) => return (text, result),
            _ => {}
        }
    }
    panic!("Stream ended without a result message");
}

#[tokio::test]
async fn test_cli_version_is_supported() {
    init_tracing();
    let version = check_cli_version(None).await.expect("CLI version check failed");
    assert!(
        semver::Version::parse(&version).is_ok(),
        "unexpected version string: {}",
        version
    );
}

#[tokio::test]
async fn test_simple_math_query() {
    init_tracing();
    let options = ClaudeCodeOptions::new()
        .with_system_prompt("You are a helpful assistant that responds concisely.")
        .with_permission_mode(PermissionMode::Default)
        .with_max_turns(1);

    let (text, result) = run("What is 15 + 25? Reply with just the number.", options).await;

    assert!(!result.is_error, "result was an error: {:?}", result.result);
    assert!(text.contains("40"), "15+25 should be 40, got: {}", text);
    assert!(!result.session_id.is_empty());
}

#[tokio::test]
async fn test_read_only_tool_use_in_cwd() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("secret.txt"), "the password is swordfish\n").unwrap();

    let options = ClaudeCodeOptions::new()
        .with_allowed_tools(vec!["Read".to_string()])
        .with_permission_mode(PermissionMode::AcceptEdits)
        .with_cwd(dir.path())
        .with_max_turns(3);

    let (text, result) = run(
        "Read secret.txt in the current directory and tell me the password.",
        options,
    )
    .await;

    assert!(!result.is_error);
    assert!(text.contains("swordfish"), "got: {}", text);
}

#[tokio::test]
async fn test_cancel_live_query() {
    init_tracing();
    let cancel = CancellationToken::new();
    let options = ClaudeCodeOptions::new().with_max_turns(1);
    let mut stream = query(&cancel, "Count slowly from 1 to 500.", Some(options))
        .await
        .expect("Failed to start query");

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let mut last = None;
    while let Some(item) = stream.next().await {
        last = Some(item);
    }
    match last {
        Some(Err(ClaudeCodeError::Cancelled)) => {}
        Some(Ok(Message::Result(_))) => {} // finished before the cancel landed
        other => panic!("unexpected final item: {:?}", other),
    }
    stream.close().await.unwrap();
}

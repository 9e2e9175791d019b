//! Transport layer for communicating with the Claude Code CLI.
//!
//! The [`Transport`] trait is the seam between the query pipeline and the
//! process that produces output. [`SubprocessTransport`] is the default
//! implementation: it spawns the CLI, writes the prompt to its stdin and
//! exposes its stdout as a stream of raw byte chunks.

use async_trait::async_trait;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{ClaudeCodeError, Result};
use crate::types::ClaudeCodeOptions;

/// Raw output of a transport, in arbitrarily sized chunks.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Size of each read from the CLI's stdout.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Number of stderr bytes kept for error reports.
const STDERR_TAIL_LIMIT: usize = 8 * 1024;

/// Transport for exchanging data with the CLI.
///
/// A transport is owned by exactly one query. [`close`](Transport::close) may
/// be called more than once; only the first call has an effect.
#[async_trait]
pub trait Transport: Send {
    /// Start the underlying process.
    async fn connect(&mut self) -> Result<()>;

    /// Write raw data to the process input.
    async fn write(&mut self, data: &str) -> Result<()>;

    /// Close the process input, signalling no more data will be sent.
    async fn end_input(&mut self) -> Result<()>;

    /// Take the output byte stream. Returns `None` if already taken.
    fn take_output(&mut self) -> Option<OutputStream>;

    /// Describe why the process stopped, if it stopped abnormally.
    async fn exit_detail(&mut self) -> Option<String> {
        None
    }

    /// Terminate the process and release its resources.
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport is connected and not yet closed.
    fn is_ready(&self) -> bool;
}

/// Subprocess-based transport for the Claude Code CLI.
pub struct SubprocessTransport {
    cli_path: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    close_timeout: Duration,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr_tail: Arc<Mutex<String>>,
    stderr_task: Option<JoinHandle<()>>,
    closed: bool,
}

impl std::fmt::Debug for SubprocessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessTransport")
            .field("cli_path", &self.cli_path)
            .field("args", &self.args)
            .field("cwd", &self.cwd)
            .field("pid", &self.pid())
            .field("closed", &self.closed)
            .finish()
    }
}

impl SubprocessTransport {
    /// Create a transport for the given options.
    ///
    /// Validates the options and resolves the CLI binary. Nothing is spawned
    /// until [`connect`](Transport::connect).
    pub fn new(options: &ClaudeCodeOptions) -> Result<Self> {
        options.validate()?;

        let cli_path = match &options.cli_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ClaudeCodeError::cli_not_found(format!(
                        "no CLI binary at {}",
                        path.display()
                    )));
                }
                path.clone()
            }
            None => find_cli()?,
        };

        let mut env: Vec<(String, String)> = vec![(
            "CLAUDE_CODE_ENTRYPOINT".to_string(),
            "sdk-rust".to_string(),
        )];
        let mut user_env: Vec<_> = options.env.iter().collect();
        user_env.sort();
        env.extend(user_env.into_iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Self {
            cli_path,
            args: build_command_args(options),
            cwd: options.cwd.clone(),
            env,
            close_timeout: options.effective_close_timeout(),
            child: None,
            stdin: None,
            stdout: None,
            stderr_tail: Arc::new(Mutex::new(String::new())),
            stderr_task: None,
            closed: false,
        })
    }

    /// The resolved CLI binary.
    pub fn cli_path(&self) -> &Path {
        &self.cli_path
    }

    /// The arguments passed to the CLI.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// OS process id while the process is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    fn stderr_snapshot(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.trim_end().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        if self.closed {
            return Err(ClaudeCodeError::startup("transport already closed"));
        }

        let mut cmd = Command::new(&self.cli_path);
        cmd.args(&self.args)
            .env_remove("CLAUDECODE")
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ClaudeCodeError::cli_not_found(format!(
                    "failed to execute {}: {}",
                    self.cli_path.display(),
                    e
                ))
            } else {
                ClaudeCodeError::startup_with_source(
                    format!("failed to spawn {}", self.cli_path.display()),
                    e,
                )
            }
        })?;

        info!(pid = ?child.id(), cli = %self.cli_path.display(), "Started Claude Code CLI");

        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take();

        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&self.stderr_tail);
            self.stderr_task = Some(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "claude_code_sdk::cli_stderr", "{}", line);
                    if let Ok(mut tail) = tail.lock() {
                        tail.push_str(&line);
                        tail.push('\n');
                        if tail.len() > STDERR_TAIL_LIMIT {
                            let mut cut = tail.len() - STDERR_TAIL_LIMIT;
                            while !tail.is_char_boundary(cut) {
                                cut += 1;
                            }
                            tail.drain(..cut);
                        }
                    }
                }
            }));
        }

        self.child = Some(child);
        Ok(())
    }

    async fn write(&mut self, data: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ClaudeCodeError::startup("CLI stdin is not available"))?;

        stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|e| ClaudeCodeError::startup_with_source("failed to write to CLI stdin", e))?;
        stdin
            .flush()
            .await
            .map_err(|e| ClaudeCodeError::startup_with_source("failed to flush CLI stdin", e))?;
        Ok(())
    }

    async fn end_input(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                debug!(error = %e, "CLI stdin was already closed");
            }
        }
        Ok(())
    }

    fn take_output(&mut self) -> Option<OutputStream> {
        let stdout = self.stdout.take()?;
        let stream = futures::stream::unfold(Some(stdout), |stdout| async move {
            let mut stdout = stdout?;
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            match stdout.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf), Some(stdout)))
                }
                Err(e) => Some((Err(ClaudeCodeError::Io(e)), None)),
            }
        });
        Some(Box::pin(stream))
    }

    async fn exit_detail(&mut self) -> Option<String> {
        let child = self.child.as_mut()?;
        let status = match tokio::time::timeout(self.close_timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Some(format!("failed to wait for CLI: {}", e)),
            Err(_) => return Some("CLI closed its output but is still running".to_string()),
        };

        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_millis(200), task).await;
        }

        let stderr = self.stderr_snapshot();
        let summary = match status.code() {
            Some(0) if stderr.is_empty() => return None,
            Some(0) => "CLI exited with code 0".to_string(),
            Some(code) => format!("CLI exited with code {}", code),
            None => "CLI terminated by signal".to_string(),
        };

        if stderr.is_empty() {
            Some(summary)
        } else {
            Some(format!("{}; stderr: {}", summary, stderr))
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.stdin.take();
        self.stdout.take();

        if let Some(mut child) = self.child.take() {
            terminate(&mut child, self.close_timeout).await;
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.child.is_some() && !self.closed
    }
}

/// Stop a child process: SIGTERM, bounded wait, then SIGKILL.
///
/// Failures are logged, never returned.
async fn terminate(child: &mut Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(?status, "CLI already exited");
            return;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to poll CLI status"),
    }

    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid belongs to a child we spawned and have not yet reaped.
            let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if ret != 0 {
                warn!(pid, "SIGTERM failed, proceeding to SIGKILL");
            }
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "CLI exited"),
        Ok(Err(e)) => warn!(error = %e, "failed to wait for CLI exit"),
        Err(_) => {
            debug!("CLI did not exit in time, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill CLI process");
            }
        }
    }
}

/// Build the CLI arguments for the given options.
///
/// The mapping is fixed, so equal options always produce equal arguments.
pub fn build_command_args(options: &ClaudeCodeOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "--output-format",
        "stream-json",
        "--verbose",
        "--input-format",
        "stream-json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(prompt) = &options.system_prompt {
        args.push("--system-prompt".into());
        args.push(prompt.clone());
    }

    if let Some(prompt) = &options.append_system_prompt {
        args.push("--append-system-prompt".into());
        args.push(prompt.clone());
    }

    if !options.allowed_tools.is_empty() {
        args.push("--allowedTools".into());
        args.push(options.allowed_tools.join(","));
    }

    if !options.disallowed_tools.is_empty() {
        args.push("--disallowedTools".into());
        args.push(options.disallowed_tools.join(","));
    }

    if let Some(turns) = options.max_turns {
        args.push("--max-turns".into());
        args.push(turns.to_string());
    }

    if let Some(model) = &options.model {
        args.push("--model".into());
        args.push(model.clone());
    }

    if let Some(mode) = options.permission_mode {
        args.push("--permission-mode".into());
        args.push(mode.as_str().into());
    }

    if options.continue_conversation {
        args.push("--continue".into());
    }

    if let Some(session) = &options.resume {
        args.push("--resume".into());
        args.push(session.clone());
    }

    for dir in &options.add_dirs {
        args.push("--add-dir".into());
        args.push(dir.display().to_string());
    }

    for (flag, value) in &options.extra_args {
        args.push(format!("--{}", flag));
        if let Some(value) = value {
            args.push(value.clone());
        }
    }

    args
}

/// Locate the Claude Code CLI.
///
/// Checks `PATH` first, then the usual npm, yarn and local install locations.
pub fn find_cli() -> Result<PathBuf> {
    if let Ok(path) = which::which("claude") {
        return Ok(path);
    }

    let home = std::env::var_os("HOME").map(PathBuf::from);
    let candidates = home
        .iter()
        .flat_map(|home| {
            [
                home.join(".npm-global/bin/claude"),
                home.join(".local/bin/claude"),
                home.join("node_modules/.bin/claude"),
                home.join(".yarn/bin/claude"),
                home.join(".claude/local/claude"),
            ]
        })
        .chain([PathBuf::from("/usr/local/bin/claude")]);

    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(ClaudeCodeError::cli_not_found(
        "Claude Code requires Node.js and the CLI. Install with: npm install -g @anthropic-ai/claude-code",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PermissionMode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_args_request_stream_json() {
        let args = build_command_args(&ClaudeCodeOptions::new());
        assert_eq!(
            args,
            vec![
                "--output-format",
                "stream-json",
                "--verbose",
                "--input-format",
                "stream-json"
            ]
        );
    }

    #[test]
    fn test_args_follow_fixed_order() {
        let options = ClaudeCodeOptions::new()
            .with_permission_mode(PermissionMode::AcceptEdits)
            .with_max_turns(3)
            .with_allowed_tools(vec!["Read".into(), "Write".into()])
            .with_system_prompt("be brief")
            .with_extra_arg("debug", None)
            .with_extra_arg("betas", Some("x".into()));

        let args = build_command_args(&options);
        assert_eq!(
            args[5..].to_vec(),
            vec![
                "--system-prompt",
                "be brief",
                "--allowedTools",
                "Read,Write",
                "--max-turns",
                "3",
                "--permission-mode",
                "acceptEdits",
                "--betas",
                "x",
                "--debug",
            ]
        );
    }

    #[test]
    fn test_new_rejects_missing_cli_path() {
        let options = ClaudeCodeOptions::new().with_cli_path("/no/such/claude");
        let err = SubprocessTransport::new(&options).unwrap_err();
        assert!(matches!(err, ClaudeCodeError::CliNotFound { .. }));
    }

    #[test]
    fn test_new_validates_before_resolving_cli() {
        let options = ClaudeCodeOptions::new()
            .with_cli_path("/no/such/claude")
            .with_max_turns(0);
        let err = SubprocessTransport::new(&options).unwrap_err();
        assert!(matches!(err, ClaudeCodeError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_close_before_connect_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cli = dir.path().join("claude");
        std::fs::write(&cli, "#!/bin/sh\n").unwrap();

        let mut transport =
            SubprocessTransport::new(&ClaudeCodeOptions::new().with_cli_path(&cli)).unwrap();
        assert!(!transport.is_ready());
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.connect().await.is_err());
    }
}

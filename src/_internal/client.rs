//! Internal client for starting queries.
//!
//! This module turns a prompt and [`ClaudeCodeOptions`] into a running
//! [`Query`] and wraps its channel in the public [`QueryStream`].

use futures::stream::FusedStream;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info, warn};

use super::decoder::StreamDecoder;
use super::query::Query;
use super::transport::{find_cli, SubprocessTransport, Transport};
use crate::errors::{ClaudeCodeError, Result};
use crate::types::*;

/// The message stream of a running query.
///
/// Yields messages in the order the CLI emitted them. The stream ends after
/// the first terminal item: a [`Message::Result`], or an error. It is single
/// pass; once terminated it only yields `None`.
///
/// Cancelling the token passed to [`query()`](crate::query()) makes the next
/// poll yield [`ClaudeCodeError::Cancelled`], even if messages are still
/// buffered. Dropping the stream tears the query down.
pub struct QueryStream {
    query: Query,
    receiver: mpsc::Receiver<Result<Message>>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    terminated: bool,
}

impl QueryStream {
    fn new(query: Query, receiver: mpsc::Receiver<Result<Message>>) -> Self {
        let cancelled = Box::pin(query.cancellation_token().clone().cancelled_owned());
        Self {
            query,
            receiver,
            cancelled,
            terminated: false,
        }
    }

    /// Cancel this query only.
    pub fn cancel(&self) {
        self.query.cancellation_token().cancel();
    }

    /// Stop the query and wait until the CLI process has been torn down.
    pub async fn close(mut self) -> Result<()> {
        self.terminated = true;
        self.query.stop().await
    }
}

impl Stream for QueryStream {
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.terminated = true;
            return Poll::Ready(Some(Err(ClaudeCodeError::Cancelled)));
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                let terminal = match &item {
                    Ok(message) => message.is_result(),
                    Err(_) => true,
                };
                this.terminated = terminal;
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.terminated = true;
                if this.query.cancellation_token().is_cancelled() {
                    Poll::Ready(Some(Err(ClaudeCodeError::Cancelled)))
                } else {
                    Poll::Ready(Some(Err(ClaudeCodeError::internal(
                        "reader stopped without a terminal message",
                    ))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for QueryStream {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Internal client for starting Claude Code queries.
///
/// Used by [`query()`](crate::query()) and
/// [`query_with_transport()`](crate::query_with_transport()).
pub struct InternalClient {
    options: ClaudeCodeOptions,
}

impl InternalClient {
    /// Create a new internal client.
    pub fn new(options: ClaudeCodeOptions) -> Self {
        Self { options }
    }

    /// Validate options before connecting.
    fn validate_options(&self) -> Result<()> {
        self.options.validate()
    }

    /// Start a query against the CLI subprocess.
    pub async fn process_query(
        self,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<QueryStream> {
        // Validates the options as part of resolving the invocation.
        let transport = SubprocessTransport::new(&self.options)?;
        debug!(args = ?transport.args(), "Resolved CLI invocation");
        self.start(cancel, Box::new(transport), prompt).await
    }

    /// Start a query over the given transport.
    ///
    /// Connects the transport, sends the prompt, closes input, and spawns the
    /// reader. If anything fails after connecting, the transport is closed
    /// before the error is returned.
    pub async fn process_query_with_transport(
        self,
        cancel: &CancellationToken,
        transport: Box<dyn Transport>,
        prompt: &str,
    ) -> Result<QueryStream> {
        self.validate_options()?;
        self.start(cancel, transport, prompt).await
    }

    /// Run a query over a transport whose options are already validated.
    async fn start(
        self,
        cancel: &CancellationToken,
        mut transport: Box<dyn Transport>,
        prompt: &str,
    ) -> Result<QueryStream> {
        if cancel.is_cancelled() {
            return Err(ClaudeCodeError::Cancelled);
        }

        let started = match transport.connect().await {
            Ok(()) => Self::send_prompt(transport.as_mut(), prompt).await,
            Err(e) => Err(e),
        };
        let started = started.and_then(|()| {
            if cancel.is_cancelled() {
                Err(ClaudeCodeError::Cancelled)
            } else {
                Ok(())
            }
        });

        if let Err(e) = started {
            if let Err(close_err) = transport.close().await {
                warn!(error = %close_err, "failed to tear down CLI after startup error");
            }
            return Err(e);
        }

        let decoder = StreamDecoder::from_options(&self.options);
        let (mut query, rx) = Query::new(transport, decoder, cancel.child_token());
        query.start()?;

        info!("Query started");
        Ok(QueryStream::new(query, rx))
    }

    /// Write the prompt as a stream-json user message and close input.
    async fn send_prompt(transport: &mut dyn Transport, prompt: &str) -> Result<()> {
        let message = serde_json::json!({
            "type": "user",
            "message": {"role": "user", "content": prompt},
            "parent_tool_use_id": null,
            "session_id": "default"
        });
        transport.write(&format!("{}\n", message)).await?;
        transport.end_input().await
    }
}

/// Check CLI version and warn if outdated.
///
/// Runs `<cli> --version` with a two second timeout. Uses
/// [`find_cli`] when no path is given.
pub async fn check_cli_version(cli_path: Option<&Path>) -> Result<String> {
    use std::process::Stdio;
    use tokio::process::Command;

    let path = match cli_path {
        Some(path) => path.to_path_buf(),
        None => find_cli()?,
    };

    let output = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        Command::new(&path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| ClaudeCodeError::timeout(2000))?
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ClaudeCodeError::cli_not_found(format!("CLI not found at {}", path.display()))
        } else {
            ClaudeCodeError::startup_with_source("Failed to run CLI version check", e)
        }
    })?;

    let version_str = String::from_utf8_lossy(&output.stdout);
    let version = version_str
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .unwrap_or("unknown")
        .to_string();

    if let (Ok(found), Ok(required)) = (
        semver::Version::parse(&version),
        semver::Version::parse(crate::MIN_CLI_VERSION),
    ) {
        if found < required {
            warn!(
                "CLI version {} is below minimum required version {}",
                version,
                crate::MIN_CLI_VERSION
            );
        }
    }

    Ok(version)
}

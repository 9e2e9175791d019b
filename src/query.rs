//! One-shot query entry points.
//!
//! [`query()`] spawns the Claude Code CLI for a single prompt and returns the
//! stream of messages it produces. The CLI process lives exactly as long as
//! the returned [`QueryStream`] is in use.

use tokio_util::sync::CancellationToken;

use crate::_internal::client::{InternalClient, QueryStream};
use crate::_internal::transport::Transport;
use crate::errors::Result;
use crate::types::ClaudeCodeOptions;

/// Run a single prompt through the Claude Code CLI.
///
/// Returns once the CLI has been started and the prompt delivered. Messages
/// are then read from the returned stream in the order the CLI emitted them;
/// the stream ends after the [`Message::Result`](crate::Message::Result) or
/// after the first error.
///
/// Cancelling `cancel` stops the query: the stream yields
/// [`ClaudeCodeError::Cancelled`](crate::ClaudeCodeError::Cancelled) and the
/// CLI process is terminated. Cancelling a child of `cancel` works the same.
///
/// # Errors
///
/// Fails before any message is produced if the options are invalid, the CLI
/// cannot be found or started, or `cancel` is already cancelled.
///
/// # Example
///
/// ```rust,no_run
/// use claude_code_sdk::{query, CancellationToken, ClaudeCodeOptions, Message};
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> claude_code_sdk::Result<()> {
///     let cancel = CancellationToken::new();
///     let options = ClaudeCodeOptions::new().with_max_turns(1);
///     let mut stream = query(&cancel, "What is 2 + 2?", Some(options)).await?;
///
///     while let Some(message) = stream.next().await {
///         if let Message::Assistant(msg) = message? {
///             println!("{}", msg.text());
///         }
///     }
///     Ok(())
/// }
/// ```
pub async fn query(
    cancel: &CancellationToken,
    prompt: &str,
    options: Option<ClaudeCodeOptions>,
) -> Result<QueryStream> {
    let client = InternalClient::new(options.unwrap_or_default());
    client.process_query(cancel, prompt).await
}

/// Run a single prompt over a caller-supplied transport.
///
/// Behaves like [`query()`] but skips CLI discovery and spawning. Useful for
/// testing and for hosting the CLI somewhere other than a local subprocess.
pub async fn query_with_transport(
    cancel: &CancellationToken,
    prompt: &str,
    options: Option<ClaudeCodeOptions>,
    transport: Box<dyn Transport>,
) -> Result<QueryStream> {
    let client = InternalClient::new(options.unwrap_or_default());
    client
        .process_query_with_transport(cancel, transport, prompt)
        .await
}

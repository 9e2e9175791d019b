//! # Claude Code SDK for Rust
//!
//! Run one-shot prompts through the Claude Code CLI and consume its output
//! as a typed, ordered stream of messages.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use claude_code_sdk::{query, CancellationToken, ClaudeCodeOptions, Message, PermissionMode};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> claude_code_sdk::Result<()> {
//!     let options = ClaudeCodeOptions::new()
//!         .with_system_prompt("You are a helpful assistant")
//!         .with_max_turns(1)
//!         .with_allowed_tools(vec!["Read".into(), "Write".into()])
//!         .with_permission_mode(PermissionMode::AcceptEdits);
//!
//!     let cancel = CancellationToken::new();
//!     let mut stream = query(&cancel, "Create a file called hello.txt", Some(options)).await?;
//!
//!     while let Some(message) = stream.next().await {
//!         match message? {
//!             Message::Assistant(msg) => println!("Claude: {}", msg.text()),
//!             Message::Result(result) => {
//!                 println!("Done in {}ms (error: {})", result.duration_ms, result.is_error);
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Cancellation
//!
//! Every query takes a [`CancellationToken`]. Cancelling it (or dropping the
//! [`QueryStream`]) terminates the CLI process; a cancelled stream yields
//! [`ClaudeCodeError::Cancelled`] as its last item.
//!
//! ## Requirements
//!
//! - Claude Code CLI installed (`npm install -g @anthropic-ai/claude-code`)
//! - A tokio runtime

#![warn(rustdoc::missing_crate_level_docs)]

pub mod errors;
pub mod query;
pub mod types;

#[doc(hidden)]
pub mod _internal;

pub use errors::{ClaudeCodeError, Result};
pub use query::{query, query_with_transport};
pub use types::*;

pub use _internal::client::{check_cli_version, QueryStream};
pub use _internal::transport::{find_cli, SubprocessTransport, Transport};
pub use tokio_util::sync::CancellationToken;

/// Minimum CLI version this SDK is tested against.
pub const MIN_CLI_VERSION: &str = "2.0.0";

/// SDK version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

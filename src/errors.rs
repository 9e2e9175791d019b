//! Error types for the Claude Code SDK.
//!
//! Every fallible operation in the crate returns [`Result<T>`], an alias over
//! [`ClaudeCodeError`]. Errors fall into two groups:
//!
//! - **Startup errors** ([`Configuration`](ClaudeCodeError::Configuration),
//!   [`CliNotFound`](ClaudeCodeError::CliNotFound),
//!   [`Startup`](ClaudeCodeError::Startup)) are returned directly by
//!   [`query()`](crate::query()) and mean no message stream was produced.
//! - **Stream errors** (decode failures, unknown records, premature close,
//!   cancellation, I/O) are delivered as the final item of a
//!   [`QueryStream`](crate::QueryStream).

use thiserror::Error;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, ClaudeCodeError>;

/// Errors produced while starting or consuming a query.
#[derive(Debug, Error)]
pub enum ClaudeCodeError {
    /// An option value was rejected before any process was spawned.
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// The Claude Code CLI binary could not be located.
    #[error("Claude Code CLI not found: {message}")]
    CliNotFound { message: String },

    /// The CLI process could not be started or did not accept the prompt.
    #[error("Failed to start Claude Code CLI: {message}")]
    Startup {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A record on the output stream could not be decoded.
    #[error("Failed to decode CLI output: {message}")]
    Decode {
        message: String,
        /// The offending record, when it was valid UTF-8.
        line: Option<String>,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A record carried a top-level `type` tag this SDK does not know.
    #[error("Unknown message type: {message_type}")]
    UnknownMessage {
        message_type: String,
        record: serde_json::Value,
    },

    /// The CLI closed its output without emitting a result message.
    #[error("CLI output ended before a result message{}", detail_suffix(.detail))]
    PrematureClose { detail: Option<String> },

    /// The caller cancelled the query.
    #[error("Query cancelled")]
    Cancelled,

    /// Reading from or writing to the process failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation did not finish in time.
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// A broken internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {}", detail),
        None => String::new(),
    }
}

impl ClaudeCodeError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a CLI-not-found error.
    pub fn cli_not_found(message: impl Into<String>) -> Self {
        Self::CliNotFound {
            message: message.into(),
        }
    }

    /// Create a startup error.
    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup {
            message: message.into(),
            source: None,
        }
    }

    /// Create a startup error wrapping an I/O error.
    pub fn startup_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Startup {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a decode error for a record.
    pub fn decode(message: impl Into<String>, line: Option<String>) -> Self {
        Self::Decode {
            message: message.into(),
            line,
            source: None,
        }
    }

    /// Create a decode error for a record that is not valid JSON.
    pub fn decode_json(line: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            message: format!("invalid JSON: {}", source),
            line: Some(line.into()),
            source: Some(source),
        }
    }

    /// Create an unknown-message error.
    pub fn unknown_message(message_type: impl Into<String>, record: serde_json::Value) -> Self {
        Self::UnknownMessage {
            message_type: message_type.into(),
            record,
        }
    }

    /// Create a premature-close error.
    pub fn premature_close(detail: Option<String>) -> Self {
        Self::PrematureClose { detail }
    }

    /// Create a timeout error.
    pub fn timeout(ms: u64) -> Self {
        Self::Timeout(ms)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error means no stream was produced.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::CliNotFound { .. } | Self::Startup { .. }
        )
    }

    /// Whether this error is the caller's cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

//! Type definitions for the Claude Code SDK.
//!
//! This module contains the configuration object handed to
//! [`query()`](crate::query()) and the closed set of message and content
//! block types decoded from the CLI's output.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ClaudeCodeError, Result};

/// Default maximum size of a single output record (1 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Default time to wait for the CLI to exit before killing it.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Permission Mode
// ============================================================================

/// Permission mode passed to the CLI via `--permission-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// CLI prompts for dangerous tools.
    #[default]
    Default,
    /// Auto-accept file edits.
    AcceptEdits,
    /// Plan only, no execution.
    Plan,
    /// Allow all tools without prompting.
    BypassPermissions,
}

impl PermissionMode {
    /// The flag value the CLI expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the decoder does with a record whose top-level `type` is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownMessagePolicy {
    /// Deliver an [`UnknownMessage`](ClaudeCodeError::UnknownMessage) error
    /// and end the stream.
    #[default]
    Fail,
    /// Log the record and keep reading.
    Skip,
}

// ============================================================================
// Options
// ============================================================================

/// Configuration for a single query.
///
/// All fields are optional; unset fields fall back to the CLI's own defaults.
/// Nothing is validated when the options are built. Problems are reported as
/// [`ClaudeCodeError::Configuration`] when the transport starts.
///
/// ```
/// use claude_code_sdk::{ClaudeCodeOptions, PermissionMode};
///
/// let options = ClaudeCodeOptions::new()
///     .with_system_prompt("You are a helpful assistant that responds concisely.")
///     .with_max_turns(1)
///     .with_allowed_tools(vec!["Read".to_string(), "Write".to_string()])
///     .with_permission_mode(PermissionMode::AcceptEdits);
/// assert_eq!(options.max_turns, Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClaudeCodeOptions {
    /// Replaces the CLI's system prompt.
    pub system_prompt: Option<String>,
    /// Appended to the CLI's system prompt.
    pub append_system_prompt: Option<String>,
    /// Maximum conversation turns. Must be positive when set.
    pub max_turns: Option<u32>,
    /// Tools the agent may use without asking.
    pub allowed_tools: Vec<String>,
    /// Tools the agent may never use.
    pub disallowed_tools: Vec<String>,
    /// Permission mode.
    pub permission_mode: Option<PermissionMode>,
    /// Working directory for the CLI process.
    pub cwd: Option<PathBuf>,
    /// Model name or alias.
    pub model: Option<String>,
    /// Continue the most recent conversation.
    pub continue_conversation: bool,
    /// Resume a specific session.
    pub resume: Option<String>,
    /// Additional directories the agent may access.
    pub add_dirs: Vec<PathBuf>,
    /// Explicit path to the CLI binary.
    pub cli_path: Option<PathBuf>,
    /// Extra environment variables for the CLI process.
    pub env: HashMap<String, String>,
    /// Additional `--flag [value]` arguments, passed in key order.
    pub extra_args: BTreeMap<String, Option<String>>,
    /// Maximum size in bytes of one output record.
    pub max_buffer_size: Option<usize>,
    /// How long teardown waits for the CLI to exit before killing it.
    pub close_timeout: Option<Duration>,
    /// Handling of records with an unknown top-level type.
    pub unknown_message_policy: UnknownMessagePolicy,
}

impl ClaudeCodeOptions {
    /// Create options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set text appended to the system prompt.
    pub fn with_append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.append_system_prompt = Some(prompt.into());
        self
    }

    /// Set the maximum number of turns.
    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    /// Set the allowed tools.
    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    /// Set the disallowed tools.
    pub fn with_disallowed_tools(mut self, tools: Vec<String>) -> Self {
        self.disallowed_tools = tools;
        self
    }

    /// Set the permission mode.
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = Some(mode);
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Continue the most recent conversation.
    pub fn with_continue_conversation(mut self) -> Self {
        self.continue_conversation = true;
        self
    }

    /// Resume the given session.
    pub fn with_resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume = Some(session_id.into());
        self
    }

    /// Add a directory the agent may access.
    pub fn with_add_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.add_dirs.push(dir.into());
        self
    }

    /// Use an explicit CLI binary.
    pub fn with_cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_path = Some(path.into());
        self
    }

    /// Add an environment variable for the CLI process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a passthrough CLI flag.
    pub fn with_extra_arg(mut self, flag: impl Into<String>, value: Option<String>) -> Self {
        self.extra_args.insert(flag.into(), value);
        self
    }

    /// Set the maximum size of one output record.
    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = Some(bytes);
        self
    }

    /// Set the teardown grace period.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// Set the unknown-message policy.
    pub fn with_unknown_message_policy(mut self, policy: UnknownMessagePolicy) -> Self {
        self.unknown_message_policy = policy;
        self
    }

    /// Effective record size limit.
    pub fn effective_max_buffer_size(&self) -> usize {
        self.max_buffer_size.unwrap_or(DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Effective teardown grace period.
    pub fn effective_close_timeout(&self) -> Duration {
        self.close_timeout.unwrap_or(DEFAULT_CLOSE_TIMEOUT)
    }

    /// Check every option, returning the first problem found.
    ///
    /// Called when the transport starts, not when the options are built.
    pub fn validate(&self) -> Result<()> {
        if self.max_turns == Some(0) {
            return Err(ClaudeCodeError::configuration(
                "max_turns must be a positive integer",
            ));
        }

        for tool in self.allowed_tools.iter().chain(&self.disallowed_tools) {
            validate_tool_name(tool)?;
        }

        if let Some(cwd) = &self.cwd {
            validate_directory("cwd", cwd)?;
        }
        for dir in &self.add_dirs {
            validate_directory("add_dirs", dir)?;
        }

        for (name, prompt) in [
            ("system_prompt", &self.system_prompt),
            ("append_system_prompt", &self.append_system_prompt),
        ] {
            if prompt.as_deref().is_some_and(|p| p.contains('\0')) {
                return Err(ClaudeCodeError::configuration(format!(
                    "{} must not contain NUL bytes",
                    name
                )));
            }
        }

        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ClaudeCodeError::configuration(format!(
                    "invalid environment variable name: {:?}",
                    key
                )));
            }
        }

        for flag in self.extra_args.keys() {
            if flag.is_empty() || flag.starts_with('-') {
                return Err(ClaudeCodeError::configuration(format!(
                    "extra_args keys must be bare flag names, got {:?}",
                    flag
                )));
            }
        }

        if self.max_buffer_size == Some(0) {
            return Err(ClaudeCodeError::configuration(
                "max_buffer_size must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn validate_tool_name(tool: &str) -> Result<()> {
    if tool.trim().is_empty() {
        return Err(ClaudeCodeError::configuration("tool names must not be empty"));
    }
    if tool.contains(',') || tool.chars().any(char::is_control) {
        return Err(ClaudeCodeError::configuration(format!(
            "invalid tool name: {:?}",
            tool
        )));
    }
    Ok(())
}

fn validate_directory(field: &str, path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ClaudeCodeError::configuration(format!(
            "{} is not a directory: {}",
            field,
            path.display()
        ))),
        Err(e) => Err(ClaudeCodeError::configuration(format!(
            "{} is not accessible: {} ({})",
            field,
            path.display(),
            e
        ))),
    }
}

// ============================================================================
// Content Blocks
// ============================================================================

/// Plain text from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

/// Extended thinking output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    pub thinking: String,
    pub signature: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// The outcome of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// One piece of model output inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Thinking(ThinkingBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

impl ContentBlock {
    /// The text of a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(block) => Some(&block.text),
            _ => None,
        }
    }

    /// Whether this is a tool-use block.
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse(_))
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Content of a user message: plain text, or blocks (tool results).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserMessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A message from the user side of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: UserMessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

impl UserMessage {
    /// The text content, if this message is plain text.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            UserMessageContent::Text(text) => Some(text),
            UserMessageContent::Blocks(_) => None,
        }
    }
}

/// A response from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

impl AssistantMessage {
    /// All text blocks concatenated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect()
    }

    /// All tool-use blocks, in order.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(tool) => Some(tool),
                _ => None,
            })
            .collect()
    }
}

/// A CLI lifecycle event such as `init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub subtype: String,
    /// The full raw record.
    pub data: serde_json::Value,
}

/// The terminal message of a run.
///
/// `is_error == true` is reported by the CLI itself and is still a
/// successfully decoded message, not a protocol error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub duration_api_ms: u64,
    pub is_error: bool,
    #[serde(default)]
    pub num_turns: u32,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// A decoded record from the CLI's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    System(SystemMessage),
    Result(ResultMessage),
}

impl Message {
    /// Whether this is the terminal result message.
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Whether this is an assistant message.
    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant(_))
    }

    /// Borrow as an assistant message.
    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(msg) => Some(msg),
            _ => None,
        }
    }

    /// Borrow as a result message.
    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Self::Result(msg) => Some(msg),
            _ => None,
        }
    }
}

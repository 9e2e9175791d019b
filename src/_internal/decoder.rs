//! Incremental decoder for the CLI's newline-delimited output.
//!
//! [`StreamDecoder`] accepts raw byte chunks as they are read from the
//! process, reassembles records that span several reads, and turns each
//! complete record into a [`Message`] via
//! [`parse_record`](super::message_parser::parse_record). Its output does not
//! depend on how the bytes were split across chunks.

use tracing::{debug, warn};

use super::message_parser::parse_record;
use crate::errors::{ClaudeCodeError, Result};
use crate::types::{ClaudeCodeOptions, Message, UnknownMessagePolicy, DEFAULT_MAX_BUFFER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Still expecting records.
    Streaming,
    /// A result message was decoded; later records are extraneous.
    Finished,
    /// A terminal error was produced.
    Failed,
}

/// Frames and decodes the CLI's output stream.
#[derive(Debug)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    max_buffer_size: usize,
    unknown_message_policy: UnknownMessagePolicy,
    state: DecoderState,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_SIZE, UnknownMessagePolicy::default())
    }
}

impl StreamDecoder {
    /// Create a decoder with an explicit record size limit and policy.
    pub fn new(max_buffer_size: usize, unknown_message_policy: UnknownMessagePolicy) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer_size,
            unknown_message_policy,
            state: DecoderState::Streaming,
        }
    }

    /// Create a decoder configured from query options.
    pub fn from_options(options: &ClaudeCodeOptions) -> Self {
        Self::new(
            options.effective_max_buffer_size(),
            options.unknown_message_policy,
        )
    }

    /// Whether the decoder has produced its terminal item.
    pub fn is_finished(&self) -> bool {
        self.state != DecoderState::Streaming
    }

    /// Feed a chunk of raw output.
    ///
    /// Returns the messages (and at most one terminal error) completed by this
    /// chunk, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<Message>> {
        let mut items = Vec::new();
        if self.state == DecoderState::Failed {
            return items;
        }

        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let record = self.buffer[start..end].to_vec();
            start = end + 1;
            self.decode_record(&record, &mut items);
            if self.state == DecoderState::Failed {
                self.buffer.clear();
                return items;
            }
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_buffer_size {
            let size = self.buffer.len();
            self.buffer.clear();
            if self.state == DecoderState::Streaming {
                self.state = DecoderState::Failed;
                items.push(Err(ClaudeCodeError::decode(
                    format!(
                        "record exceeds maximum buffer size of {} bytes ({} buffered)",
                        self.max_buffer_size, size
                    ),
                    None,
                )));
            }
        }

        items
    }

    /// Signal end of output.
    ///
    /// Decodes a final record that lacked a trailing newline, then reports
    /// [`ClaudeCodeError::PrematureClose`] if no result message was seen.
    pub fn finish(&mut self) -> Vec<Result<Message>> {
        let mut items = Vec::new();
        if self.state == DecoderState::Failed {
            return items;
        }

        let record = std::mem::take(&mut self.buffer);
        self.decode_record(&record, &mut items);

        if self.state == DecoderState::Streaming {
            self.state = DecoderState::Failed;
            items.push(Err(ClaudeCodeError::premature_close(None)));
        }
        items
    }

    fn decode_record(&mut self, record: &[u8], items: &mut Vec<Result<Message>>) {
        if record.len() > self.max_buffer_size && self.state == DecoderState::Streaming {
            self.state = DecoderState::Failed;
            items.push(Err(ClaudeCodeError::decode(
                format!(
                    "record exceeds maximum buffer size of {} bytes ({} bytes)",
                    self.max_buffer_size,
                    record.len()
                ),
                None,
            )));
            return;
        }

        let record = record.strip_suffix(b"\r").unwrap_or(record);
        if record.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        let line = match std::str::from_utf8(record) {
            Ok(line) => line.trim(),
            Err(e) => {
                if self.state == DecoderState::Streaming {
                    self.state = DecoderState::Failed;
                    items.push(Err(ClaudeCodeError::decode(
                        format!("record is not valid UTF-8: {}", e),
                        None,
                    )));
                }
                return;
            }
        };

        if self.state == DecoderState::Finished {
            debug!(record = line, "ignoring output after result message");
            return;
        }

        match parse_record(line) {
            Ok(message) => {
                if message.is_result() {
                    self.state = DecoderState::Finished;
                }
                items.push(Ok(message));
            }
            Err(ClaudeCodeError::UnknownMessage { message_type, .. })
                if self.unknown_message_policy == UnknownMessagePolicy::Skip =>
            {
                warn!(message_type = %message_type, "skipping unknown message type");
            }
            Err(e) => {
                self.state = DecoderState::Failed;
                items.push(Err(e));
            }
        }
    }
}

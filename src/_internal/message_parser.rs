//! Record parsing for CLI output.
//!
//! Converts one JSON record from the CLI's `stream-json` output into a typed
//! [`Message`]. Parsing is pure: the same record always produces an equal
//! message.

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::{ClaudeCodeError, Result};
use crate::types::*;

/// Parse one line of CLI output.
///
/// The line must be a complete JSON object without its trailing newline.
pub fn parse_record(line: &str) -> Result<Message> {
    let raw: Value =
        serde_json::from_str(line).map_err(|e| ClaudeCodeError::decode_json(line, e))?;
    parse_message(raw)
}

/// Parse a raw JSON record into a [`Message`].
///
/// Records with a `type` other than `user`, `assistant`, `system` or
/// `result` produce [`ClaudeCodeError::UnknownMessage`]; they are never
/// coerced into a known variant.
pub fn parse_message(raw: Value) -> Result<Message> {
    let obj = raw
        .as_object()
        .ok_or_else(|| decode_error("record is not a JSON object", &raw))?;

    let msg_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| decode_error("record has no string 'type' field", &raw))?;

    match msg_type {
        "user" => parse_user_message(obj, &raw).map(Message::User),
        "assistant" => parse_assistant_message(obj, &raw).map(Message::Assistant),
        "system" => parse_system_message(obj, &raw).map(Message::System),
        "result" => parse_result_message(obj, &raw).map(Message::Result),
        other => Err(ClaudeCodeError::unknown_message(other, raw.clone())),
    }
}

fn parse_user_message(obj: &Map<String, Value>, raw: &Value) -> Result<UserMessage> {
    let message = required_object(obj, "message", raw)?;
    let content = match message.get("content") {
        Some(Value::String(text)) => UserMessageContent::Text(text.clone()),
        Some(Value::Array(blocks)) => UserMessageContent::Blocks(parse_content_blocks(blocks, raw)?),
        _ => {
            return Err(decode_error(
                "user message content must be a string or an array",
                raw,
            ))
        }
    };

    Ok(UserMessage {
        content,
        uuid: optional_string(obj, "uuid"),
        parent_tool_use_id: optional_string(obj, "parent_tool_use_id"),
    })
}

fn parse_assistant_message(obj: &Map<String, Value>, raw: &Value) -> Result<AssistantMessage> {
    let message = required_object(obj, "message", raw)?;
    let blocks = message
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| decode_error("assistant message content must be an array", raw))?;

    Ok(AssistantMessage {
        content: parse_content_blocks(blocks, raw)?,
        model: optional_string(message, "model").unwrap_or_default(),
        parent_tool_use_id: optional_string(obj, "parent_tool_use_id"),
    })
}

fn parse_system_message(obj: &Map<String, Value>, raw: &Value) -> Result<SystemMessage> {
    let subtype = required_str(obj, "subtype", raw)?;
    Ok(SystemMessage {
        subtype: subtype.to_string(),
        data: raw.clone(),
    })
}

fn parse_result_message(obj: &Map<String, Value>, raw: &Value) -> Result<ResultMessage> {
    let num_turns = match obj.get("num_turns") {
        None | Some(Value::Null) => 0,
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| decode_error("result field 'num_turns' must be a u32 integer", raw))?,
    };

    let total_cost_usd = match obj.get("total_cost_usd") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_f64()
                .ok_or_else(|| decode_error("result field 'total_cost_usd' must be a number", raw))?,
        ),
    };

    Ok(ResultMessage {
        subtype: optional_string(obj, "subtype").unwrap_or_default(),
        duration_ms: required_u64(obj, "duration_ms", raw)?,
        duration_api_ms: obj
            .get("duration_api_ms")
            .and_then(Value::as_u64)
            .unwrap_or_default(),
        is_error: obj
            .get("is_error")
            .and_then(Value::as_bool)
            .ok_or_else(|| decode_error("result field 'is_error' must be a boolean", raw))?,
        num_turns,
        session_id: required_str(obj, "session_id", raw)?.to_string(),
        total_cost_usd,
        usage: obj.get("usage").filter(|v| !v.is_null()).cloned(),
        result: optional_string(obj, "result"),
    })
}

/// Parse a content block array.
///
/// Blocks with an unrecognised `type` are skipped so that new block kinds
/// do not break older consumers. A known block with bad fields is an error.
fn parse_content_blocks(blocks: &[Value], raw: &Value) -> Result<Vec<ContentBlock>> {
    let mut parsed = Vec::with_capacity(blocks.len());
    for block in blocks {
        if let Some(block) = parse_content_block(block, raw)? {
            parsed.push(block);
        }
    }
    Ok(parsed)
}

fn parse_content_block(block: &Value, raw: &Value) -> Result<Option<ContentBlock>> {
    let obj = block
        .as_object()
        .ok_or_else(|| decode_error("content block is not a JSON object", raw))?;
    let block_type = required_str(obj, "type", raw)?;

    let parsed = match block_type {
        "text" => ContentBlock::Text(TextBlock {
            text: required_str(obj, "text", raw)?.to_string(),
        }),
        "thinking" => ContentBlock::Thinking(ThinkingBlock {
            thinking: required_str(obj, "thinking", raw)?.to_string(),
            signature: optional_string(obj, "signature").unwrap_or_default(),
        }),
        "tool_use" => ContentBlock::ToolUse(ToolUseBlock {
            id: optional_string(obj, "id").unwrap_or_default(),
            name: required_str(obj, "name", raw)?.to_string(),
            input: obj.get("input").cloned().unwrap_or(Value::Null),
        }),
        "tool_result" => ContentBlock::ToolResult(ToolResultBlock {
            tool_use_id: required_str(obj, "tool_use_id", raw)?.to_string(),
            content: obj.get("content").filter(|v| !v.is_null()).cloned(),
            is_error: obj.get("is_error").and_then(Value::as_bool),
        }),
        other => {
            debug!(block_type = other, "skipping unknown content block");
            return Ok(None);
        }
    };

    Ok(Some(parsed))
}

fn decode_error(message: &str, raw: &Value) -> ClaudeCodeError {
    ClaudeCodeError::decode(message, Some(raw.to_string()))
}

fn required_object<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    raw: &Value,
) -> Result<&'a Map<String, Value>> {
    obj.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| decode_error(&format!("missing object field '{}'", key), raw))
}

fn required_str<'a>(obj: &'a Map<String, Value>, key: &str, raw: &Value) -> Result<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| decode_error(&format!("missing string field '{}'", key), raw))
}

fn required_u64(obj: &Map<String, Value>, key: &str, raw: &Value) -> Result<u64> {
    obj.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| decode_error(&format!("missing integer field '{}'", key), raw))
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assistant_with_tool_use() {
        let msg = parse_message(json!({
            "type": "assistant",
            "message": {
                "model": "claude-sonnet-4-5",
                "content": [
                    {"type": "text", "text": "Reading."},
                    {"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {"path": "a.txt"}}
                ]
            }
        }))
        .unwrap();

        let asst = msg.as_assistant().unwrap();
        assert_eq!(asst.model, "claude-sonnet-4-5");
        assert_eq!(asst.text(), "Reading.");
        assert_eq!(asst.tool_uses()[0].input["path"], "a.txt");
    }

    #[test]
    fn test_unknown_content_block_is_skipped() {
        let msg = parse_message(json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "text", "text": "before"},
                    {"type": "server_tool_use", "id": "x"},
                    {"type": "tool_use", "id": "t", "name": "Bash", "input": {}}
                ]
            }
        }))
        .unwrap();

        let asst = msg.as_assistant().unwrap();
        assert_eq!(asst.content.len(), 2);
        assert_eq!(asst.content[0].as_text(), Some("before"));
        assert!(asst.content[1].is_tool_use());
    }

    #[test]
    fn test_unknown_message_type_is_error() {
        let err = parse_message(json!({"type": "rate_limit_event"})).unwrap_err();
        match err {
            ClaudeCodeError::UnknownMessage { message_type, .. } => {
                assert_eq!(message_type, "rate_limit_event")
            }
            other => panic!("expected UnknownMessage, got {:?}", other),
        }
    }

    #[test]
    fn test_result_requires_session_id() {
        let err = parse_message(json!({
            "type": "result",
            "subtype": "success",
            "duration_ms": 5,
            "is_error": false,
            "num_turns": 1
        }))
        .unwrap_err();
        assert!(matches!(err, ClaudeCodeError::Decode { .. }));
    }

    #[test]
    fn test_minimal_result_record() {
        let msg = parse_record(r#"{"type":"result","session_id":"s1","duration_ms":5,"is_error":false}"#)
            .unwrap();
        let result = msg.as_result().unwrap();
        assert_eq!(result.session_id, "s1");
        assert_eq!(result.duration_ms, 5);
        assert!(!result.is_error);
        assert_eq!(result.subtype, "");
        assert_eq!(result.num_turns, 0);
        assert!(result.total_cost_usd.is_none());
    }

    #[test]
    fn test_result_rejects_ill_typed_num_turns() {
        let err = parse_message(json!({
            "type": "result",
            "session_id": "s1",
            "duration_ms": 5,
            "is_error": false,
            "num_turns": "three"
        }))
        .unwrap_err();
        assert!(matches!(err, ClaudeCodeError::Decode { .. }));
    }

    #[test]
    fn test_system_keeps_full_record() {
        let raw = json!({"type": "system", "subtype": "init", "session_id": "s1"});
        let msg = parse_message(raw.clone()).unwrap();
        match msg {
            Message::System(sys) => {
                assert_eq!(sys.subtype, "init");
                assert_eq!(sys.data, raw);
            }
            other => panic!("expected System, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_record_rejects_invalid_json() {
        assert!(matches!(
            parse_record(r#"{"type": "assistant""#),
            Err(ClaudeCodeError::Decode { .. })
        ));
    }
}

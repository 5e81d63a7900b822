use serde_json::Value;

use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

fn chunk(kind: StreamChunkKind, content: impl Into<String>) -> Option<StreamChunk> {
    Some(StreamChunk {
        kind,
        content: content.into(),
    })
}

fn non_empty<'a>(v: &'a Value) -> Option<&'a str> {
    v.as_str().filter(|s| !s.is_empty())
}

/// One `data:` line of a chat-completions event stream. Comments, other
/// fields and deltas with nothing in them yield `None`.
///
/// Reasoning wins over tool calls, which win over content, when a provider
/// packs several into one delta.
pub fn parse_sse_line(line: &str) -> DeskBenchResult<Option<StreamChunk>> {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };
    if data == "[DONE]" {
        return Ok(chunk(StreamChunkKind::Done, ""));
    }

    let event: Value = serde_json::from_str(data).map_err(|e| DeskBenchError::SseParsing(e.to_string()))?;
    let choice = &event["choices"][0];
    if choice.is_null() {
        return Ok(None);
    }
    let delta = &choice["delta"];

    if let Some(text) = non_empty(&delta["reasoning_content"]) {
        return Ok(chunk(StreamChunkKind::Reasoning, text));
    }
    if let Some(calls) = delta["tool_calls"].as_array().filter(|c| !c.is_empty()) {
        let raw = serde_json::to_string(calls).map_err(|e| DeskBenchError::SseParsing(e.to_string()))?;
        return Ok(chunk(StreamChunkKind::ToolCall, raw));
    }
    if let Some(text) = non_empty(&delta["content"]) {
        return Ok(chunk(StreamChunkKind::Content, text));
    }
    Ok(if choice["finish_reason"].is_string() {
        chunk(StreamChunkKind::Done, "")
    } else {
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<StreamChunk> {
        parse_sse_line(line).expect("parse")
    }

    #[test]
    fn skips_keepalive_and_non_data_lines() {
        assert!(parse("").is_none());
        assert!(parse(": ping").is_none());
        assert!(parse("event: message").is_none());
    }

    #[test]
    fn done_marker() {
        assert_eq!(parse("data: [DONE]").map(|c| c.kind), Some(StreamChunkKind::Done));
    }

    #[test]
    fn content_and_reasoning_deltas() {
        let c = parse(r#"data: {"choices":[{"delta":{"content":"Action:"}}]}"#).expect("chunk");
        assert_eq!(c.kind, StreamChunkKind::Content);
        assert_eq!(c.content, "Action:");

        let r = parse(r#"data: {"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#).expect("chunk");
        assert_eq!(r.kind, StreamChunkKind::Reasoning);
    }

    #[test]
    fn tool_call_delta_is_forwarded_as_json() {
        let c = parse(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"click","arguments":""}}]}}]}"#,
        )
        .expect("chunk");
        assert_eq!(c.kind, StreamChunkKind::ToolCall);
        assert!(c.content.contains("\"click\""));
    }

    #[test]
    fn finish_reason_ends_stream() {
        let c = parse(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#).expect("chunk");
        assert_eq!(c.kind, StreamChunkKind::Done);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(DeskBenchError::SseParsing(_))
        ));
    }
}

//! Upstream line parsing into the normalized [`Event`] model.
//!
//! Two wire variants are supported:
//! - `PrefixedLine`: `<key>:<value>` lines (`0` answer, `g` reasoning, `f` message id,
//!   `e` step finish, `d` message finish, `3` error).
//! - `JsonSse`: `data:{...}` frames whose `type`/`content_type` select the event.

use crate::constants::{SSE_DATA_PREFIX, SSE_DONE_SENTINEL};
use crate::specs::conversational::SseFrame;
use crate::specs::flat::FinishPayload;
use crate::types::{Event, PrismError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAdapter {
    PrefixedLine,
    JsonSse,
}

impl EventAdapter {
    pub fn name(&self) -> &'static str {
        match self {
            EventAdapter::PrefixedLine => "prefixed_line",
            EventAdapter::JsonSse => "json_sse",
        }
    }

    /// Parse one framed line. Blank and unrecognized lines yield `Ok(None)`.
    pub fn parse_line(&self, line: &str) -> Result<Option<Event>> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return Ok(None);
        }
        match self {
            EventAdapter::PrefixedLine => Ok(parse_prefixed_line(line)),
            EventAdapter::JsonSse => parse_sse_line(line),
        }
    }
}

/// Keys of the prefixed-line protocol that carry meaning for the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKey {
    MessageId,
    Reasoning,
    Answer,
    StepFinish,
    MessageFinish,
    Error,
}

impl LineKey {
    fn from_key(key: &str) -> Option<Self> {
        match key.trim() {
            "f" => Some(LineKey::MessageId),
            "g" => Some(LineKey::Reasoning),
            "0" => Some(LineKey::Answer),
            "e" => Some(LineKey::StepFinish),
            "d" => Some(LineKey::MessageFinish),
            "3" => Some(LineKey::Error),
            _ => None,
        }
    }
}

fn parse_prefixed_line(line: &str) -> Option<Event> {
    let (key, value) = line.split_once(':')?;
    let key = match LineKey::from_key(key) {
        Some(k) => k,
        None => {
            tracing::debug!("[☁️  -> ⚙️ ] Ignoring unknown line key {:?}", key);
            return None;
        }
    };

    match key {
        LineKey::MessageId => None,
        LineKey::Reasoning => Some(Event::Reasoning(decode_text_value(value))),
        LineKey::Answer => Some(Event::Answer(decode_text_value(value))),
        LineKey::Error => Some(Event::Error(decode_text_value(value))),
        LineKey::StepFinish | LineKey::MessageFinish => {
            match serde_json::from_str::<FinishPayload>(value) {
                Ok(payload) => Some(Event::Done {
                    finish_reason: payload.finish_reason,
                    usage: payload.usage.map(Into::into),
                }),
                Err(e) => {
                    // Upstream formats are not contractually stable; keep the text
                    tracing::warn!(
                        "[☁️  -> ⚙️ ] Malformed finish payload ({}), treating as answer text",
                        e
                    );
                    Some(Event::Answer(lenient_unquote(value)))
                }
            }
        }
    }
}

/// Decode a JSON string value, falling back to quote trimming and `\n` unescaping.
fn decode_text_value(value: &str) -> String {
    match serde_json::from_str::<String>(value) {
        Ok(text) => text,
        Err(_) => lenient_unquote(value),
    }
}

fn lenient_unquote(value: &str) -> String {
    let value = value.strip_prefix('"').unwrap_or(value);
    let value = value.strip_suffix('"').unwrap_or(value);
    value.replace("\\n", "\n")
}

fn parse_sse_line(line: &str) -> Result<Option<Event>> {
    let data = match line.strip_prefix(SSE_DATA_PREFIX) {
        Some(d) => d.trim_start(),
        None => return Ok(None),
    };

    if data == SSE_DONE_SENTINEL {
        return Ok(Some(Event::done()));
    }

    let frame: SseFrame = serde_json::from_str(data).map_err(|e| {
        let snippet = crate::str_utils::prefix_chars(data, 200);
        PrismError::Parse(format!("invalid JSON frame ({}): {}", e, snippet))
    })?;

    match frame.kind.as_str() {
        "answer" => {
            let content = frame.content_text();
            let event = match frame.content_type.as_deref() {
                Some("thinking") => Event::Reasoning(content),
                Some("text") => Event::Answer(content),
                Some("card") => Event::Card(content),
                other => {
                    tracing::debug!("[☁️  -> ⚙️ ] Ignoring answer frame with content_type {:?}", other);
                    return Ok(None);
                }
            };
            Ok(Some(event))
        }
        "error" => {
            let message = match frame.message.clone() {
                Some(m) if !m.is_empty() => m,
                _ => frame.content_text(),
            };
            Ok(Some(Event::Error(message)))
        }
        other => {
            tracing::debug!("[☁️  -> ⚙️ ] Ignoring frame type {:?}", other);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Usage;

    fn prefixed(line: &str) -> Option<Event> {
        match EventAdapter::PrefixedLine.parse_line(line) {
            Ok(e) => e,
            Err(e) => panic!("prefixed line should never fail: {}", e),
        }
    }

    fn sse(line: &str) -> Option<Event> {
        match EventAdapter::JsonSse.parse_line(line) {
            Ok(e) => e,
            Err(e) => panic!("unexpected parse error: {}", e),
        }
    }

    #[test]
    fn test_prefixed_answer_and_reasoning() {
        assert_eq!(prefixed("0:\"Hi\""), Some(Event::Answer("Hi".into())));
        assert_eq!(prefixed("g:\"let me think\""), Some(Event::Reasoning("let me think".into())));
        assert_eq!(prefixed("0:\"line one\\nline two\""), Some(Event::Answer("line one\nline two".into())));
        assert_eq!(prefixed("0:\"say \\\"hi\\\"\""), Some(Event::Answer("say \"hi\"".into())));
    }

    #[test]
    fn test_prefixed_value_may_contain_colons() {
        assert_eq!(prefixed("0:\"time: 12:30\""), Some(Event::Answer("time: 12:30".into())));
    }

    #[test]
    fn test_prefixed_finish_and_usage() {
        assert_eq!(
            prefixed("e:{\"finishReason\":\"stop\"}"),
            Some(Event::Done {
                finish_reason: Some("stop".into()),
                usage: None
            })
        );
        assert_eq!(
            prefixed("d:{\"finishReason\":\"length\",\"usage\":{\"promptTokens\":3,\"completionTokens\":4}}"),
            Some(Event::Done {
                finish_reason: Some("length".into()),
                usage: Some(Usage::new(3, 4)),
            })
        );
    }

    #[test]
    fn test_prefixed_usage_total_saturates() {
        assert_eq!(
            prefixed("d:{\"usage\":{\"promptTokens\":4294967295,\"completionTokens\":1}}"),
            Some(Event::Done {
                finish_reason: None,
                usage: Some(Usage {
                    prompt_tokens: u32::MAX,
                    completion_tokens: 1,
                    total_tokens: u32::MAX,
                }),
            })
        );
    }

    #[test]
    fn test_prefixed_ignores_unknown_and_blank() {
        assert_eq!(prefixed("f:{\"messageId\":\"msg-1\"}"), None);
        assert_eq!(prefixed("9:{\"toolCallId\":\"x\"}"), None);
        assert_eq!(prefixed(""), None);
        assert_eq!(prefixed("   \r"), None);
        assert_eq!(prefixed("no separator here"), None);
    }

    #[test]
    fn test_prefixed_error_line() {
        assert_eq!(prefixed("3:\"rate limited\""), Some(Event::Error("rate limited".into())));
    }

    // Lenient fallback mirrors observed upstream behavior, not a documented contract.
    #[test]
    fn test_prefixed_lenient_fallback_is_upstream_format_dependent() {
        assert_eq!(prefixed("0:\"unterminated\\nvalue"), Some(Event::Answer("unterminated\nvalue".into())));
        assert_eq!(prefixed("0:bare text"), Some(Event::Answer("bare text".into())));
        assert_eq!(prefixed("e:not json"), Some(Event::Answer("not json".into())));
    }

    #[test]
    fn test_sse_content_types() {
        assert_eq!(
            sse(r#"data:{"type":"answer","content":"","content_type":"thinking"}"#),
            Some(Event::Reasoning(String::new()))
        );
        assert_eq!(
            sse(r#"data: {"type":"answer","content":"42","content_type":"text"}"#),
            Some(Event::Answer("42".into()))
        );
        assert_eq!(
            sse("data:{\"type\":\"answer\",\"content\":\"{}\",\"content_type\":\"card\"}\r"),
            Some(Event::Card("{}".into()))
        );
    }

    #[test]
    fn test_sse_ignores_other_frames() {
        assert_eq!(sse(r#"data:{"type":"follow_up","content":"more?"}"#), None);
        assert_eq!(sse(r#"data:{"type":"answer","content":"x","content_type":"progress"}"#), None);
        assert_eq!(sse("event:message"), None);
        assert_eq!(sse(""), None);
        assert_eq!(sse("data:[DONE]"), Some(Event::done()));
    }

    #[test]
    fn test_sse_error_frame() {
        assert_eq!(
            sse(r#"data:{"type":"error","message":"quota exceeded"}"#),
            Some(Event::Error("quota exceeded".into()))
        );
    }

    #[test]
    fn test_sse_invalid_json_is_fatal() {
        let result = EventAdapter::JsonSse.parse_line("data:{\"type\":\"answer\",");
        match result {
            Err(e) => assert!(matches!(e.inner, PrismError::Parse(_))),
            Ok(ev) => panic!("Expected parse error, got {:?}", ev),
        }
    }
}

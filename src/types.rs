use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing_error::SpanTrace;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl DeviceId {
    pub fn short(&self) -> &str {
        crate::str_utils::prefix_chars(&self.0, 8)
    }
}

impl ConversationId {
    pub fn short(&self) -> &str {
        crate::str_utils::prefix_chars(&self.0, 6)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum PrismError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Conversation create failed: {0}")]
    ConversationCreate(String),

    #[error("Upstream error (status {0}): {1}")]
    Upstream(axum::http::StatusCode, String),

    #[error("Upstream stream error: {0}")]
    UpstreamStream(String),

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String, SpanTrace),
}

impl PrismError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into(), SpanTrace::capture())
    }

    /// HTTP status and machine-readable code for the client-facing error body
    pub fn classify(&self) -> (axum::http::StatusCode, &'static str) {
        use axum::http::StatusCode;
        match self {
            PrismError::Upstream(_, _) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            PrismError::UpstreamStream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_STREAM_ERROR"),
            PrismError::ConversationCreate(_) => {
                (StatusCode::BAD_GATEWAY, "CONVERSATION_CREATE_FAILED")
            }
            PrismError::Network(_) => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR"),
            PrismError::Parse(_) => (StatusCode::BAD_GATEWAY, "PARSE_ERROR"),
            PrismError::UnsupportedModel(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_MODEL"),
            PrismError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            PrismError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            PrismError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR")
            }
            PrismError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            PrismError::Internal(_, _) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    pub fn to_error_body(&self) -> serde_json::Value {
        let (_, code) = self.classify();
        serde_json::json!({
            "error": {
                "message": self.to_string(),
                "code": code,
            }
        })
    }
}

impl axum::response::IntoResponse for ObservedError {
    fn into_response(self) -> axum::response::Response {
        let (status, _) = self.inner.classify();
        (status, axum::Json(self.inner.to_error_body())).into_response()
    }
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: PrismError,
    pub span_trace: SpanTrace,
}

impl std::fmt::Display for ObservedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<PrismError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;

/// --- CALLER-FACING REQUEST ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Developer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

/// Assistant turns may carry `"content": null`
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(PrismError::InvalidRequest("messages cannot be empty".into()).into());
        }
        if !self.messages.iter().any(|m| m.role == Role::User) {
            return Err(
                PrismError::InvalidRequest("at least one user message is required".into()).into(),
            );
        }
        Ok(())
    }

    /// Content of the trailing message, whatever its role
    pub fn last_message_content(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

/// --- NORMALIZED EVENT MODEL ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// One upstream line, normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Reasoning(String),
    Answer(String),
    /// Raw card JSON, parsed lazily by the card aggregator
    Card(String),
    Done {
        finish_reason: Option<String>,
        usage: Option<Usage>,
    },
    Error(String),
}

impl Event {
    pub fn done() -> Self {
        Event::Done {
            finish_reason: None,
            usage: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Reasoning(_) => "reasoning",
            Event::Answer(_) => "answer",
            Event::Card(_) => "card",
            Event::Done { .. } => "done",
            Event::Error(_) => "error",
        }
    }
}

/// Session identifiers reported back to the caller on the final chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMeta {
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// One unit of normalized output, in emission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputChunk {
    pub role: Option<Role>,
    pub reasoning_delta: Option<String>,
    pub content_delta: Option<String>,
    pub card_markdown: Option<String>,
    pub finish_reason: Option<String>,
    pub meta: Option<SessionMeta>,
    pub usage: Option<Usage>,
}

impl OutputChunk {
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content_delta: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning_delta: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn cards(markdown: impl Into<String>) -> Self {
        Self {
            card_markdown: Some(markdown.into()),
            ..Default::default()
        }
    }

    pub fn has_text(&self) -> bool {
        self.reasoning_delta.is_some() || self.content_delta.is_some() || self.card_markdown.is_some()
    }

    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// How reasoning text is placed in streaming output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReasoningFormat {
    /// Thinking block inside `content`, delimited by markers
    #[default]
    Inline,
    /// Separate `reasoning_content` field, markers suppressed
    Field,
}

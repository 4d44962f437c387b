use serde::{Deserialize, Serialize};

use crate::types::{OutputChunk, Role, SessionMeta, Usage};

/// --- NORMALIZED CHAT-COMPLETION OUTPUT SCHEMA ---

/// Identity shared by every chunk of one response
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl ResponseEnvelope {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<SessionMeta>,
}

impl ChatCompletionChunk {
    pub fn from_output(envelope: &ResponseEnvelope, chunk: &OutputChunk) -> Self {
        // Card markdown travels as a plain content delta
        let content = match (&chunk.content_delta, &chunk.card_markdown) {
            (Some(text), Some(cards)) => Some(format!("{}{}", text, cards)),
            (Some(text), None) => Some(text.clone()),
            (None, Some(cards)) => Some(cards.clone()),
            (None, None) => None,
        };

        Self {
            id: envelope.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: envelope.created,
            model: envelope.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: chunk.role.clone(),
                    content,
                    reasoning_content: chunk.reasoning_delta.clone(),
                    meta: chunk.meta.clone(),
                },
                finish_reason: chunk.finish_reason.clone(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<SessionMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl ModelList {
    pub fn from_ids(ids: &[String]) -> Self {
        let created = chrono::Utc::now().timestamp();
        Self {
            object: "list".to_string(),
            data: ids
                .iter()
                .map(|id| ModelCard {
                    id: id.clone(),
                    object: "model".to_string(),
                    created,
                    owned_by: "library".to_string(),
                })
                .collect(),
        }
    }
}

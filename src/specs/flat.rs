use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Role, Usage};

/// --- MESSAGE-LIST UPSTREAM SCHEMA (prefixed-line stream) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatChatRequest {
    pub id: String,
    pub messages: Vec<FlatMessage>,
    pub selected_model: String,
    pub mcp_servers: Vec<serde_json::Value>,
    pub chat_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatMessage {
    pub role: Role,
    pub content: String,
    pub parts: Vec<FlatPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl From<&ChatMessage> for FlatMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.clone(),
            content: msg.content.clone(),
            parts: vec![FlatPart {
                kind: "text".to_string(),
                text: msg.content.clone(),
            }],
        }
    }
}

/// Body of `e:` (step finish) and `d:` (message finish) lines
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishPayload {
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<FlatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
}

impl From<FlatUsage> for Usage {
    fn from(u: FlatUsage) -> Self {
        Usage::new(u.prompt_tokens.unwrap_or(0), u.completion_tokens.unwrap_or(0))
    }
}

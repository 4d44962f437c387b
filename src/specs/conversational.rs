use serde::{Deserialize, Serialize};

/// --- SESSION-BOOTSTRAP UPSTREAM SCHEMA (JSON server-sent events) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub bot_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResponse {
    #[serde(default)]
    pub success: bool,
    pub data: Option<CreatedConversation>,
    #[serde(default, alias = "errMessage", alias = "message")]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedConversation {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationChatRequest {
    pub stream: bool,
    pub bot_code: String,
    pub user_action: String,
    pub model: String,
    pub conversation_id: String,
    pub question: String,
}

/// One `data:` frame of the chat stream
#[derive(Debug, Clone, Deserialize)]
pub struct SseFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SseFrame {
    /// Text content; non-string payloads are kept in their JSON form
    pub fn content_text(&self) -> String {
        match &self.content {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Payload of a `card` frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEnvelope {
    pub card_info: CardInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    #[serde(default)]
    pub card_items: Vec<CardItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardItem {
    #[serde(rename = "type")]
    pub kind: serde_json::Value,
    /// Usually a JSON document encoded as a string
    #[serde(default)]
    pub content: serde_json::Value,
}

impl CardItem {
    pub fn kind_str(&self) -> String {
        match &self.kind {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Decode `content`, unwrapping one level of string encoding
    pub fn decoded_content(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        match &self.content {
            serde_json::Value::String(s) => serde_json::from_str(s),
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSearchResult {
    #[serde(default)]
    pub id_index: Option<serde_json::Value>,
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
}

use std::sync::Arc;

use crate::adapter::EventAdapter;
use crate::constants::{
    BOT_CODE, CONVERSATIONAL_BASE_URL, CONVERSATIONAL_MODELS, CONVERSATIONAL_ORIGIN,
    CONVERSATION_CHAT_PATH, CONVERSATION_CREATE_PATH, FLAT_BASE_URL, FLAT_CHAT_ID,
    FLAT_CHAT_PATH, FLAT_MODELS, FLAT_USER_ID,
};
use crate::hardening::RetryPolicy;
use crate::identity::{IdentityRotator, Session};
use crate::prompt::{build_full_prompt, map_model, user_action};
use crate::sign::SignedHeaders;
use crate::specs::conversational::{
    ConversationChatRequest, CreateConversationRequest, CreateConversationResponse,
};
use crate::specs::flat::{FlatChatRequest, FlatMessage};
use crate::types::{ChatRequest, ConversationId, ObservedError, PrismError, Result, SessionMeta};

/// Which upstream dialect to speak
#[derive(Debug, Clone)]
pub enum UpstreamProfile {
    /// Session bootstrap, then a single-question chat call answered with JSON SSE
    Conversational { base_url: String, origin: String },
    /// One call carrying the whole message list, answered with prefixed lines
    Flat {
        base_url: String,
        chat_id: String,
        user_id: String,
    },
}

impl UpstreamProfile {
    pub fn conversational() -> Self {
        UpstreamProfile::Conversational {
            base_url: CONVERSATIONAL_BASE_URL.to_string(),
            origin: CONVERSATIONAL_ORIGIN.to_string(),
        }
    }

    pub fn flat() -> Self {
        UpstreamProfile::Flat {
            base_url: FLAT_BASE_URL.to_string(),
            chat_id: FLAT_CHAT_ID.to_string(),
            user_id: FLAT_USER_ID.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UpstreamProfile::Conversational { .. } => "conversational",
            UpstreamProfile::Flat { .. } => "flat",
        }
    }

    pub fn adapter(&self) -> EventAdapter {
        match self {
            UpstreamProfile::Conversational { .. } => EventAdapter::JsonSse,
            UpstreamProfile::Flat { .. } => EventAdapter::PrefixedLine,
        }
    }

    pub fn models(&self) -> &'static [&'static str] {
        match self {
            UpstreamProfile::Conversational { .. } => CONVERSATIONAL_MODELS,
            UpstreamProfile::Flat { .. } => FLAT_MODELS,
        }
    }

    pub fn with_base_url(self, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        match self {
            UpstreamProfile::Conversational { origin, .. } => UpstreamProfile::Conversational {
                base_url: url,
                origin,
            },
            UpstreamProfile::Flat {
                chat_id, user_id, ..
            } => UpstreamProfile::Flat {
                base_url: url,
                chat_id,
                user_id,
            },
        }
    }

    fn origin(&self) -> &str {
        match self {
            UpstreamProfile::Conversational { origin, .. } => origin,
            UpstreamProfile::Flat { base_url, .. } => base_url,
        }
    }

    fn referer(&self) -> String {
        match self {
            UpstreamProfile::Conversational { origin, .. } => format!("{}/", origin),
            UpstreamProfile::Flat {
                base_url, chat_id, ..
            } => format!("{}/chat/{}", base_url, chat_id),
        }
    }
}

/// An accepted upstream chat response, not yet read
pub struct UpstreamStream {
    pub response: reqwest::Response,
    pub adapter: EventAdapter,
    pub meta: SessionMeta,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    profile: UpstreamProfile,
    retry: RetryPolicy,
    rotator: Arc<IdentityRotator>,
}

impl UpstreamClient {
    pub fn new(
        http: reqwest::Client,
        profile: UpstreamProfile,
        retry: RetryPolicy,
        rotator: Arc<IdentityRotator>,
    ) -> Self {
        Self {
            http,
            profile,
            retry,
            rotator,
        }
    }

    pub fn profile(&self) -> &UpstreamProfile {
        &self.profile
    }

    pub fn rotator(&self) -> &Arc<IdentityRotator> {
        &self.rotator
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.profile.models().contains(&model)
    }

    /// Run the full call sequence for one request and hand back the open stream.
    pub async fn open(&self, request: &ChatRequest) -> Result<UpstreamStream> {
        if !self.supports_model(&request.model) {
            return Err(PrismError::UnsupportedModel(request.model.clone()).into());
        }

        let session = self.rotator.acquire(false);
        let mut meta = session.meta();

        let response = match &self.profile {
            UpstreamProfile::Conversational { base_url, .. } => {
                let conversation_id = self.create_conversation(&session).await?;
                self.rotator
                    .attach_conversation(&session.device_id, conversation_id.clone());
                meta.conversation_id = Some(conversation_id.to_string());

                let last_message = request.last_message_content().unwrap_or("");
                let payload = ConversationChatRequest {
                    stream: true,
                    bot_code: BOT_CODE.to_string(),
                    user_action: user_action(&request.model, last_message),
                    model: map_model(&request.model).to_string(),
                    conversation_id: conversation_id.0,
                    question: build_full_prompt(&request.messages),
                };
                let body = serde_json::to_string(&payload)?;
                let url = format!("{}{}", base_url, CONVERSATION_CHAT_PATH);
                self.send_with_retry(&session, &url, body).await?
            }
            UpstreamProfile::Flat {
                base_url,
                chat_id,
                user_id,
            } => {
                let payload = FlatChatRequest {
                    id: chat_id.clone(),
                    messages: request.messages.iter().map(FlatMessage::from).collect(),
                    selected_model: request.model.clone(),
                    mcp_servers: Vec::new(),
                    chat_id: chat_id.clone(),
                    user_id: user_id.clone(),
                };
                let body = serde_json::to_string(&payload)?;
                let url = format!("{}{}", base_url, FLAT_CHAT_PATH);
                self.send_with_retry(&session, &url, body).await?
            }
        };

        tracing::info!(
            "[☁️  -> ⚙️ ] Status: {} ({} via device {})",
            response.status(),
            self.profile.name(),
            session.device_id.short()
        );

        Ok(UpstreamStream {
            response,
            adapter: self.profile.adapter(),
            meta,
        })
    }

    /// Bootstrap a conversation for `session`. Failures are terminal for the request.
    pub async fn create_conversation(&self, session: &Session) -> Result<ConversationId> {
        let base_url = match &self.profile {
            UpstreamProfile::Conversational { base_url, .. } => base_url,
            UpstreamProfile::Flat { .. } => {
                return Err(PrismError::internal("flat upstream has no conversations").into())
            }
        };
        let url = format!("{}{}", base_url, CONVERSATION_CREATE_PATH);
        let body = serde_json::to_string(&CreateConversationRequest {
            bot_code: BOT_CODE.to_string(),
        })?;

        let this = self;
        let created = self
            .retry
            .execute_with_retry(|| {
                let body = body.clone();
                let url = url.clone();
                async move {
                    let response = this.send_once(session, &url, body).await?;
                    let text = response.text().await.map_err(PrismError::Network)?;
                    let parsed: CreateConversationResponse = serde_json::from_str(&text)
                        .map_err(|e| {
                            PrismError::ConversationCreate(format!("unreadable response: {}", e))
                        })?;
                    match parsed.data {
                        Some(data) if parsed.success => Ok(ConversationId(data.conversation_id)),
                        _ => Err(ObservedError::from(PrismError::ConversationCreate(
                            match parsed.msg {
                                Some(m) => m,
                                None => "upstream refused to create a conversation".to_string(),
                            },
                        ))),
                    }
                }
            })
            .await;

        match created {
            Ok(id) => {
                tracing::info!(
                    "[⚙️  -> ☁️ ] Created conversation {} for device {}",
                    id.short(),
                    session.device_id.short()
                );
                Ok(id)
            }
            Err(e) => {
                tracing::error!("[☁️  -> ⚙️ ] Conversation create failed: {}", e);
                if matches!(e.inner, PrismError::ConversationCreate(_)) {
                    Err(e)
                } else {
                    Err(PrismError::ConversationCreate(e.inner.to_string()).into())
                }
            }
        }
    }

    async fn send_with_retry(
        &self,
        session: &Session,
        url: &str,
        body: String,
    ) -> Result<reqwest::Response> {
        let this = self;
        self.retry
            .execute_with_retry(|| {
                let body = body.clone();
                async move { this.send_once(session, url, body).await }
            })
            .await
    }

    /// One signed POST. Non-2xx responses become `Upstream` errors.
    async fn send_once(
        &self,
        session: &Session,
        url: &str,
        body: String,
    ) -> Result<reqwest::Response> {
        let signed = SignedHeaders::for_body(&body);
        tracing::debug!("[⚙️  -> ☁️ ] POST {} ({} bytes)", url, body.len());

        let response = self
            .http
            .post(url)
            .header("Origin", self.profile.origin())
            .header("Referer", self.profile.referer())
            .header("User-Agent", session.user_agent.as_str())
            .header("Accept", "*/*")
            .header("deviceId", session.device_id.0.as_str())
            .header("nonce", signed.nonce.as_str())
            .header("sign", signed.sign.as_str())
            .header("timestamp", signed.timestamp.as_str())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ObservedError::from(PrismError::Network(e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = match response.text().await {
            Ok(text) => text,
            Err(e) => format!("Upstream error (body unreadable): {}", e),
        };
        tracing::warn!("[☁️  -> ⚙️ ] Upstream Error {}: {}", status, error_body);
        Err(PrismError::Upstream(status, error_body).into())
    }
}

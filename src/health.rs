use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub upstream: &'static str,
    pub session: Option<SessionSnapshot>,
}

/// Redacted view of the shared identity
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub device: String,
    pub has_conversation: bool,
    pub usage_count: u32,
    pub max_uses: u32,
}

pub async fn liveness(State(state): State<Arc<AppState>>) -> Json<LivenessResponse> {
    let upstream = state.engine.upstream();
    let rotator = upstream.rotator();
    let session = rotator.current().map(|s| SessionSnapshot {
        device: format!("{}...", s.device_id.short()),
        has_conversation: s.conversation_id.is_some(),
        usage_count: s.usage_count,
        max_uses: rotator.max_uses(),
    });

    Json(LivenessResponse {
        status: "ok",
        upstream: upstream.profile().name(),
        session,
    })
}

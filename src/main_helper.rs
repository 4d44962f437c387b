use crate::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_SESSION_USES, DEFAULT_RETRY_BASE_DELAY_MS};
use crate::engine::PrismEngine;
use crate::hardening::RetryPolicy;
use crate::identity::IdentityRotator;
use crate::logging::request_id_middleware;
use crate::specs::openai::{ChatCompletionChunk, ModelList, ResponseEnvelope};
use crate::types::*;
use crate::upstream::{UpstreamClient, UpstreamProfile};
use axum::response::sse::{Event as SseEvent, KeepAlive};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response, Sse},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UpstreamKind {
    /// Session bootstrap upstream speaking JSON server-sent events
    Conversational,
    /// Message-list upstream speaking prefixed lines
    Flat,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, env = "PRISM_PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(long, env = "PRISM_HOST", default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, env = "PRISM_UPSTREAM", value_enum, default_value_t = UpstreamKind::Conversational)]
    pub upstream: UpstreamKind,
    /// Override the upstream base URL
    #[arg(long, env = "PRISM_UPSTREAM_URL")]
    pub upstream_url: Option<String>,
    /// Bearer key callers must present; open access when unset
    #[arg(long, env = "PRISM_API_KEY")]
    pub api_key: Option<String>,
    #[arg(long, env = "PRISM_MAX_SESSION_USES", default_value_t = DEFAULT_MAX_SESSION_USES)]
    pub max_session_uses: u32,
    #[arg(long, env = "PRISM_MAX_RETRIES", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_retries: u32,
    #[arg(long, env = "PRISM_RETRY_BASE_DELAY_MS", default_value_t = DEFAULT_RETRY_BASE_DELAY_MS)]
    pub retry_base_delay_ms: u64,
    #[arg(long, env = "PRISM_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,
    #[arg(long, env = "PRISM_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,
    #[arg(long, env = "PRISM_MAX_BODY_SIZE", default_value_t = 10 * 1024 * 1024)]
    pub max_body_size: usize,
    #[arg(long, env = "PRISM_REASONING_FORMAT", value_enum, default_value_t = ReasoningFormat::Inline)]
    pub reasoning_format: ReasoningFormat,
    #[arg(long, env = "PRISM_LOG_DIR", default_value = ".")]
    pub log_dir: String,
    #[arg(long, env = "PRISM_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Args {
    pub fn profile(&self) -> UpstreamProfile {
        let profile = match self.upstream {
            UpstreamKind::Conversational => UpstreamProfile::conversational(),
            UpstreamKind::Flat => UpstreamProfile::flat(),
        };
        match &self.upstream_url {
            Some(url) if !url.is_empty() => profile.with_base_url(url.clone()),
            _ => profile,
        }
    }
}

pub struct AppState {
    pub engine: PrismEngine,
    pub args: Arc<Args>,
}

impl AppState {
    pub fn from_args(args: Args) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(args.request_timeout_secs))
            .connect_timeout(Duration::from_secs(args.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()?;

        let upstream = UpstreamClient::new(
            client,
            args.profile(),
            RetryPolicy::new(args.max_retries, args.retry_base_delay_ms),
            Arc::new(IdentityRotator::new(args.max_session_uses)),
        );

        Ok(Self {
            engine: PrismEngine::new(upstream, args.reasoning_format),
            args: Arc::new(args),
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body_size = state.args.max_body_size;
    Router::new()
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/chat/completions", post(chat_completions_handler))
        .route("/v1/models", get(models_handler))
        .route("/health", get(crate::health::liveness))
        .layer(axum::extract::DefaultBodyLimit::max(max_body_size))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let expected = match state.args.api_key.as_deref() {
        Some(k) if !k.is_empty() => k,
        _ => return Ok(()),
    };
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(PrismError::Unauthorized("invalid API key".into()).into()),
        None => Err(PrismError::Unauthorized("missing bearer token".into()).into()),
    }
}

async fn chat_completions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = check_api_key(&state, &headers) {
        tracing::warn!("[🖱️  -> ⚙️ ] Rejected: {}", e);
        return e.into_response();
    }

    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return ObservedError::from(PrismError::InvalidRequest(format!(
                "malformed request body: {}",
                e
            )))
            .into_response()
        }
    };

    tracing::info!(
        "[🖱️  -> ⚙️ ] Received Turn [History: {}] Model: {} Stream: {}",
        request.messages.len(),
        request.model,
        request.stream
    );

    if request.stream {
        stream_response(&state, request).await
    } else {
        match state.engine.complete(&request).await {
            Ok(completion) => Json(completion).into_response(),
            Err(e) => {
                tracing::error!("[☁️  -> ⚙️ ] Request Error: {}", e);
                e.into_response()
            }
        }
    }
}

async fn stream_response(state: &AppState, request: ChatRequest) -> Response {
    let rx = match state.engine.open_stream(&request).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!("[☁️  -> ⚙️ ] Request Error: {}", e);
            return e.into_response();
        }
    };

    sse_response(rx, ResponseEnvelope::new(request.model))
}

fn chunk_event(envelope: &ResponseEnvelope, chunk: &OutputChunk) -> SseEvent {
    let data = match serde_json::to_string(&ChatCompletionChunk::from_output(envelope, chunk)) {
        Ok(json) => json,
        Err(e) => PrismError::Serialization(e).to_error_body().to_string(),
    };
    SseEvent::default().data(data)
}

fn error_event(err: &PrismError) -> SseEvent {
    SseEvent::default().data(err.to_error_body().to_string())
}

/// SSE body for a driver channel, always terminated by `[DONE]`.
///
/// A channel that closes without a final chunk or an error gets an error
/// frame before the sentinel.
pub fn sse_response(
    rx: mpsc::Receiver<Result<OutputChunk>>,
    envelope: ResponseEnvelope,
) -> Response {
    let events = ReceiverStream::new(rx)
        .map(Some)
        .chain(futures_util::stream::once(async { None }))
        .scan(false, move |terminated, item| {
            let events = match item {
                Some(Ok(chunk)) => {
                    if chunk.is_final() {
                        *terminated = true;
                    }
                    vec![chunk_event(&envelope, &chunk)]
                }
                Some(Err(e)) => {
                    *terminated = true;
                    vec![error_event(&e.inner)]
                }
                None => {
                    let mut tail = Vec::new();
                    if !*terminated {
                        tracing::error!("[☁️  -> ⚙️ ] Stream driver stopped before the final chunk");
                        tail.push(error_event(&PrismError::internal(
                            "stream ended without a final chunk",
                        )));
                    }
                    tail.push(SseEvent::default().data(crate::constants::SSE_DONE_SENTINEL));
                    tail
                }
            };
            futures_util::future::ready(Some(events))
        })
        .flat_map(|events| {
            futures_util::stream::iter(
                events.into_iter().map(Ok::<SseEvent, Infallible>),
            )
        });

    Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text(": keepalive"),
        )
        .into_response()
}

async fn models_handler(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList::from_ids(&state.engine.models()))
}

/// Parse CLI/env configuration, loading `.env` first.
pub fn load_args() -> Args {
    dotenvy::dotenv().ok();
    Args::parse()
}

use crate::specs::openai::ChatCompletion;
use crate::types::{Event, OutputChunk};
use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};
use std::panic;
use tracing::{error, info};
use tracing::{info_span, Instrument};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const DEFAULT_LOG_FILTER: &str = "prism=info";

/// Install the global subscriber: stdout, a redacted daily log file, and span traces.
///
/// The returned guard must be held for the lifetime of the process or buffered
/// file output is lost.
pub fn init_tracing(log_dir: &str, json: bool) -> WorkerGuard {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => DEFAULT_LOG_FILTER.into(),
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "prism.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(
        crate::redaction_layer::RedactingWriter::new(file_appender),
    );

    let stdout_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(|| crate::redaction_layer::RedactingWriter::new(std::io::stdout()))
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(|| crate::redaction_layer::RedactingWriter::new(std::io::stdout()))
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    guard
}

/// Sets up a global panic hook that logs panics using tracing.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = match panic_info.location() {
            Some(l) => format!("{}:{}:{}", l.file(), l.line(), l.column()),
            None => "unknown location".to_string(),
        };

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
    let request_id = Uuid::new_v4().to_string();
    if let Ok(val) = request_id.parse() {
        req.headers_mut().insert(REQUEST_ID_HEADER, val);
    }

    let span = info_span!("request", request_id = %request_id);
    next.run(req).instrument(span).await
}

pub fn log_completion_summary(completion: &ChatCompletion) {
    if let Some(choice) = completion.choices.first() {
        let reasoning_chars = match &choice.message.reasoning_content {
            Some(r) => r.len(),
            None => 0,
        };
        info!(
            "[⚙️  -> 🖱️ ] [RES] Finish: {} | Content: {} chars | Reasoning: {} chars",
            choice.finish_reason,
            choice.message.content.len(),
            reasoning_chars
        );
    }
}

/// Per-stream counters, logged once when the stream ends
#[derive(Debug, Default)]
pub struct StreamMetric {
    pub adapter: &'static str,
    pub events: usize,
    pub reasoning_events: usize,
    pub answer_events: usize,
    pub cards: usize,
    pub chunks: usize,
    pub text_chars: usize,
    pub tokens: usize,
}

impl StreamMetric {
    pub fn new(adapter: &'static str) -> Self {
        Self {
            adapter,
            ..Default::default()
        }
    }

    pub fn record_event(&mut self, event: &Event) {
        self.events += 1;
        match event {
            Event::Reasoning(_) => self.reasoning_events += 1,
            Event::Answer(_) => self.answer_events += 1,
            Event::Card(_) => self.cards += 1,
            Event::Done { usage: Some(u), .. } => self.tokens = u.total_tokens as usize,
            Event::Done { .. } | Event::Error(_) => {}
        }
    }

    pub fn record_chunk(&mut self, chunk: &OutputChunk) {
        self.chunks += 1;
        for text in [&chunk.reasoning_delta, &chunk.content_delta, &chunk.card_markdown]
            .into_iter()
            .flatten()
        {
            self.text_chars += text.len();
        }
    }

    pub fn log_summary(&self) {
        info!(
            "[STREAM END] Adapter: {} | Events: {} (reasoning {}, answer {}, cards {}) | Chunks: {} | Text: {} chars | Tokens: {}",
            self.adapter,
            self.events,
            self.reasoning_events,
            self.answer_events,
            self.cards,
            self.chunks,
            self.text_chars,
            self.tokens
        );
    }
}

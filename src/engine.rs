use crate::emitter::{ChunkEmitter, ResponseAggregator};
use crate::logging::log_completion_summary;
use crate::specs::openai::{ChatCompletion, ResponseEnvelope};
use crate::streaming::{StreamHandler, StreamOutcome};
use crate::types::*;
use crate::upstream::{UpstreamClient, UpstreamStream};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::Instrument;

const MAX_HISTORY_LENGTH: usize = 1000;
const CHUNK_CHANNEL_CAPACITY: usize = 100;

/// Per-request orchestration over one shared upstream client.
pub struct PrismEngine {
    upstream: UpstreamClient,
    reasoning_format: ReasoningFormat,
}

impl PrismEngine {
    pub fn new(upstream: UpstreamClient, reasoning_format: ReasoningFormat) -> Self {
        Self {
            upstream,
            reasoning_format,
        }
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn reasoning_format(&self) -> ReasoningFormat {
        self.reasoning_format
    }

    pub fn models(&self) -> Vec<String> {
        self.upstream
            .profile()
            .models()
            .iter()
            .map(|m| m.to_string())
            .collect()
    }

    pub fn validate(&self, request: &ChatRequest) -> Result<()> {
        request.validate()?;
        if request.messages.len() > MAX_HISTORY_LENGTH {
            return Err(PrismError::InvalidRequest(format!(
                "history too long: {} messages (max {})",
                request.messages.len(),
                MAX_HISTORY_LENGTH
            ))
            .into());
        }
        if !self.upstream.supports_model(&request.model) {
            return Err(PrismError::UnsupportedModel(request.model.clone()).into());
        }
        Ok(())
    }

    /// Open the upstream and start the driver. Failures before the first
    /// upstream byte are returned directly; later ones arrive on the channel.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<Result<OutputChunk>>> {
        self.validate(request)?;
        let upstream = self.upstream.open(request).await?;
        Ok(Self::spawn_driver(
            upstream,
            ChunkEmitter::new(self.reasoning_format),
        ))
    }

    /// Run the whole pipeline and fold it into one response.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        self.validate(request)?;
        let upstream = self.upstream.open(request).await?;
        // Field format keeps reasoning and answer apart for aggregation
        let rx = Self::spawn_driver(upstream, ChunkEmitter::new(ReasoningFormat::Field));

        let completion = Self::aggregate(rx, &request.model).await?;
        log_completion_summary(&completion);
        Ok(completion)
    }

    /// Drain a driver channel into one response. A channel that closes
    /// before the final chunk means the driver died and is reported as such.
    pub async fn aggregate(
        mut rx: mpsc::Receiver<Result<OutputChunk>>,
        model: &str,
    ) -> Result<ChatCompletion> {
        let mut aggregator = ResponseAggregator::new();
        while let Some(item) = rx.recv().await {
            aggregator.push(item?);
        }
        if !aggregator.is_finished() {
            tracing::error!("[☁️  -> ⚙️ ] Stream driver stopped before the final chunk");
        }
        aggregator.into_completion(&ResponseEnvelope::new(model))
    }

    fn spawn_driver(
        upstream: UpstreamStream,
        emitter: ChunkEmitter,
    ) -> mpsc::Receiver<Result<OutputChunk>> {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let UpstreamStream {
            response,
            adapter,
            meta,
        } = upstream;
        let body = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other))
            .boxed();

        let stream_span = tracing::info_span!(
            "stream",
            adapter = adapter.name(),
            device = %crate::str_utils::prefix_chars(&meta.device_id, 8),
        );

        tokio::spawn(
            async move {
                let outcome = StreamHandler::handle_stream(body, adapter, emitter, meta, tx).await;
                if outcome != StreamOutcome::Completed {
                    tracing::warn!("[☁️  -> ⚙️ ] Stream ended early: {:?}", outcome);
                }
            }
            .instrument(stream_span),
        );
        rx
    }
}

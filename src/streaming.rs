use crate::adapter::EventAdapter;
use crate::constants::MAX_STREAM_LINES;
use crate::emitter::ChunkEmitter;
use crate::frame::FrameReader;
use crate::logging::StreamMetric;
use crate::types::*;
use bytes::Bytes;
use futures_util::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

/// How a driven stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed,
    /// The receiving side went away; the upstream body was dropped
    Disconnected,
}

pub type ChunkSender = mpsc::Sender<Result<OutputChunk>>;

pub struct StreamHandler;

impl StreamHandler {
    /// Pull the upstream body through framing, parsing and emission, sending
    /// each output chunk on `tx`. A terminal error is sent as the last item.
    pub async fn handle_stream<R>(
        body: R,
        adapter: EventAdapter,
        emitter: ChunkEmitter,
        meta: SessionMeta,
        tx: ChunkSender,
    ) -> StreamOutcome
    where
        R: Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin + Send,
    {
        let mut lines = FramedRead::new(StreamReader::new(body), FrameReader::new());
        let mut emitter = emitter;
        let mut metrics = StreamMetric::new(adapter.name());
        let mut line_count = 0;

        while let Some(line_result) = lines.next().await {
            line_count += 1;
            if line_count > MAX_STREAM_LINES {
                tracing::error!(
                    "[☁️  -> ⚙️ ] Stream exceeded max line limit ({})",
                    MAX_STREAM_LINES
                );
                let _ = tx
                    .send(Err(PrismError::internal("Stream exceeded max line limit").into()))
                    .await;
                return StreamOutcome::Failed;
            }

            let outcome = Self::process_stream_line(
                line_result,
                adapter,
                &mut emitter,
                &mut metrics,
                &tx,
            )
            .await;

            if let Some(outcome) = outcome {
                metrics.log_summary();
                return outcome;
            }
        }

        for chunk in emitter.finish(meta) {
            metrics.record_chunk(&chunk);
            if tx.send(Ok(chunk)).await.is_err() {
                tracing::debug!("[⚙️  -> 🖱️ ] Receiver dropped before final chunk");
                return StreamOutcome::Disconnected;
            }
        }

        metrics.log_summary();
        StreamOutcome::Completed
    }

    /// `Some(outcome)` when the stream must stop here.
    async fn process_stream_line(
        line_result: std::result::Result<String, std::io::Error>,
        adapter: EventAdapter,
        emitter: &mut ChunkEmitter,
        metrics: &mut StreamMetric,
        tx: &ChunkSender,
    ) -> Option<StreamOutcome> {
        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("[☁️  -> ⚙️ ] Stream read error: {}", e);
                let _ = tx.send(Err(PrismError::Io(e).into())).await;
                return Some(StreamOutcome::Failed);
            }
        };

        let event = match adapter.parse_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("[☁️  -> ⚙️ ] {} parse failed: {}", adapter.name(), e);
                let _ = tx.send(Err(e)).await;
                return Some(StreamOutcome::Failed);
            }
        };
        metrics.record_event(&event);

        let chunks = match emitter.on_event(event) {
            Ok(chunks) => chunks,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return Some(StreamOutcome::Failed);
            }
        };

        for chunk in chunks {
            metrics.record_chunk(&chunk);
            if tx.send(Ok(chunk)).await.is_err() {
                tracing::info!("[⚙️  -> 🖱️ ] Client disconnected, dropping upstream stream");
                return Some(StreamOutcome::Disconnected);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{REASONING_CLOSE, REASONING_OPEN, REASONING_SEPARATOR};

    fn body(parts: &[&str]) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin + Send {
        let owned: Vec<std::result::Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        futures_util::stream::iter(owned)
    }

    fn meta() -> SessionMeta {
        SessionMeta {
            device_id: "dev".into(),
            conversation_id: None,
        }
    }

    async fn collect(
        parts: &[&str],
        adapter: EventAdapter,
        format: ReasoningFormat,
    ) -> (StreamOutcome, Vec<Result<OutputChunk>>) {
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = StreamHandler::handle_stream(
            body(parts),
            adapter,
            ChunkEmitter::new(format),
            meta(),
            tx,
        )
        .await;
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        (outcome, items)
    }

    #[tokio::test]
    async fn test_json_sse_thinking_then_answer() {
        let (outcome, items) = collect(
            &[
                "data:{\"type\":\"answer\",\"content\":\"\",\"content_type\":\"thin",
                "king\"}\ndata:{\"type\":\"answer\",\"content\":\"42\",\"content_type\":\"text\"}\n",
            ],
            EventAdapter::JsonSse,
            ReasoningFormat::Inline,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Completed);
        let chunks: Vec<OutputChunk> = items.into_iter().filter_map(|i| i.ok()).collect();
        let texts: Vec<&str> = chunks
            .iter()
            .filter_map(|c| c.content_delta.as_deref())
            .collect();
        assert_eq!(texts, vec![REASONING_OPEN, REASONING_CLOSE, REASONING_SEPARATOR, "42"]);
        assert_eq!(chunks.last().and_then(|c| c.meta.clone()), Some(meta()));
    }

    #[tokio::test]
    async fn test_prefixed_unterminated_last_line_is_flushed() {
        let (outcome, items) = collect(
            &["0:\"Hel", "lo\"\n0:\" there\""],
            EventAdapter::PrefixedLine,
            ReasoningFormat::Inline,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Completed);
        let text: String = items
            .iter()
            .filter_map(|i| i.as_ref().ok())
            .filter_map(|c| c.content_delta.clone())
            .collect();
        assert_eq!(text, "Hello there");
    }

    #[tokio::test]
    async fn test_invalid_sse_json_stops_with_error() {
        let (outcome, items) = collect(
            &[
                "data:{\"type\":\"answer\",\"content\":\"a\",\"content_type\":\"text\"}\n",
                "data:{broken\n",
                "data:{\"type\":\"answer\",\"content\":\"b\",\"content_type\":\"text\"}\n",
            ],
            EventAdapter::JsonSse,
            ReasoningFormat::Inline,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Failed);
        match items.last() {
            Some(Err(e)) => assert!(matches!(e.inner, PrismError::Parse(_))),
            other => panic!("Expected trailing parse error, got {:?}", other),
        }
        assert!(!items
            .iter()
            .filter_map(|i| i.as_ref().ok())
            .any(|c| c.content_delta.as_deref() == Some("b")));
    }

    #[tokio::test]
    async fn test_upstream_error_event_fails_stream() {
        let (outcome, items) = collect(
            &["0:\"partial\"\n3:\"overloaded\"\n"],
            EventAdapter::PrefixedLine,
            ReasoningFormat::Inline,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Failed);
        match items.last() {
            Some(Err(e)) => assert!(matches!(e.inner, PrismError::UpstreamStream(_))),
            other => panic!("Expected stream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_driver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let outcome = StreamHandler::handle_stream(
            body(&["0:\"a\"\n0:\"b\"\n"]),
            EventAdapter::PrefixedLine,
            ChunkEmitter::new(ReasoningFormat::Inline),
            meta(),
            tx,
        )
        .await;
        assert_eq!(outcome, StreamOutcome::Disconnected);
    }
}

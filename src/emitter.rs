use crate::cards::CardAggregator;
use crate::constants::{REASONING_CLOSE, REASONING_OPEN};
use crate::segmenter::{ReasoningSegmenter, Segment};
use crate::specs::openai::{ChatCompletion, CompletionChoice, CompletionMessage, ResponseEnvelope};
use crate::types::{
    Event, OutputChunk, PrismError, ReasoningFormat, Result, Role, SessionMeta, Usage,
};

const DEFAULT_FINISH_REASON: &str = "stop";

/// Turns the normalized event sequence of one request into output chunks.
///
/// Text is emitted as it arrives. Card renderings are held back and emitted
/// as one trailing chunk by [`ChunkEmitter::finish`], followed by the final
/// chunk carrying the finish reason and session meta.
#[derive(Debug)]
pub struct ChunkEmitter {
    format: ReasoningFormat,
    segmenter: ReasoningSegmenter,
    cards: CardAggregator,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    role_sent: bool,
    finished: bool,
}

impl ChunkEmitter {
    pub fn new(format: ReasoningFormat) -> Self {
        Self {
            format,
            segmenter: ReasoningSegmenter::new(),
            cards: CardAggregator::new(),
            finish_reason: None,
            usage: None,
            role_sent: false,
            finished: false,
        }
    }

    pub fn format(&self) -> ReasoningFormat {
        self.format
    }

    /// An `Error` event fails the request; nothing further should be fed.
    pub fn on_event(&mut self, event: Event) -> Result<Vec<OutputChunk>> {
        let mut out = Vec::new();
        match &event {
            Event::Reasoning(_) | Event::Answer(_) => {
                self.open_role(&mut out);
                for segment in self.segmenter.push(&event) {
                    if let Some(chunk) = self.render_segment(segment) {
                        out.push(chunk);
                    }
                }
            }
            Event::Card(raw) => {
                self.cards.accept(raw);
            }
            Event::Done {
                finish_reason,
                usage,
            } => {
                if finish_reason.is_some() {
                    self.finish_reason = finish_reason.clone();
                }
                if usage.is_some() {
                    self.usage = usage.clone();
                }
            }
            Event::Error(message) => {
                tracing::error!("[☁️  -> ⚙️ ] Upstream reported error: {}", message);
                return Err(PrismError::UpstreamStream(message.clone()).into());
            }
        }
        Ok(out)
    }

    /// Close out the stream: pending markers, card markdown, then the final chunk.
    pub fn finish(&mut self, meta: SessionMeta) -> Vec<OutputChunk> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.finished = true;
        self.open_role(&mut out);

        for segment in self.segmenter.finish() {
            if let Some(chunk) = self.render_segment(segment) {
                out.push(chunk);
            }
        }

        if let Some(markdown) = self.cards.take_markdown() {
            out.push(OutputChunk::cards(markdown));
        }

        let finish_reason = self
            .finish_reason
            .take()
            .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string());
        out.push(OutputChunk {
            finish_reason: Some(finish_reason),
            meta: Some(meta),
            usage: self.usage.take(),
            ..Default::default()
        });
        out
    }

    fn open_role(&mut self, out: &mut Vec<OutputChunk>) {
        if !self.role_sent {
            self.role_sent = true;
            out.push(OutputChunk::role(Role::Assistant));
        }
    }

    fn render_segment(&self, segment: Segment) -> Option<OutputChunk> {
        match (self.format, segment) {
            (ReasoningFormat::Inline, Segment::Marker(m)) => Some(OutputChunk::content(m)),
            (ReasoningFormat::Inline, Segment::Reasoning(t)) => Some(OutputChunk::content(t)),
            (ReasoningFormat::Field, Segment::Marker(_)) => None,
            (ReasoningFormat::Field, Segment::Reasoning(t)) => Some(OutputChunk::reasoning(t)),
            (_, Segment::Answer(t)) => Some(OutputChunk::content(t)),
        }
    }
}

/// Folds output chunks into one chat-completion response.
///
/// Expects chunks produced with [`ReasoningFormat::Field`] so reasoning and
/// answer text arrive on separate fields.
#[derive(Debug, Default)]
pub struct ResponseAggregator {
    reasoning: String,
    saw_reasoning: bool,
    content: String,
    finish_reason: Option<String>,
    meta: Option<SessionMeta>,
    usage: Option<Usage>,
    finished: bool,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: OutputChunk) {
        if let Some(text) = chunk.reasoning_delta {
            self.saw_reasoning = true;
            self.reasoning.push_str(&text);
        }
        if let Some(text) = chunk.content_delta {
            self.content.push_str(&text);
        }
        if let Some(markdown) = chunk.card_markdown {
            self.content.push_str(&markdown);
        }
        if chunk.finish_reason.is_some() {
            self.finished = true;
            self.finish_reason = chunk.finish_reason;
        }
        if chunk.meta.is_some() {
            self.meta = chunk.meta;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }

    /// Whether the final chunk has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fails when the stream stopped before its final chunk.
    pub fn into_completion(self, envelope: &ResponseEnvelope) -> Result<ChatCompletion> {
        if !self.finished {
            return Err(PrismError::internal("stream ended without a final chunk").into());
        }

        let reasoning_content = if self.saw_reasoning {
            Some(format!("{}{}{}", REASONING_OPEN, self.reasoning, REASONING_CLOSE))
        } else {
            None
        };

        Ok(ChatCompletion {
            id: envelope.id.clone(),
            object: "chat.completion".to_string(),
            created: envelope.created,
            model: envelope.model.clone(),
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: Role::Assistant,
                    content: self.content,
                    reasoning_content,
                    meta: self.meta,
                },
                finish_reason: self
                    .finish_reason
                    .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string()),
            }],
            usage: self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::REASONING_SEPARATOR;

    fn meta() -> SessionMeta {
        SessionMeta {
            device_id: "dev".into(),
            conversation_id: Some("conv".into()),
        }
    }

    fn drive(format: ReasoningFormat, events: Vec<Event>) -> Vec<OutputChunk> {
        let mut emitter = ChunkEmitter::new(format);
        let mut out = Vec::new();
        for event in events {
            match emitter.on_event(event) {
                Ok(chunks) => out.extend(chunks),
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        out.extend(emitter.finish(meta()));
        out
    }

    fn contents(chunks: &[OutputChunk]) -> Vec<&str> {
        chunks
            .iter()
            .filter_map(|c| c.content_delta.as_deref())
            .collect()
    }

    #[test]
    fn test_inline_thinking_block() {
        let chunks = drive(
            ReasoningFormat::Inline,
            vec![
                Event::Reasoning(String::new()),
                Event::Answer("42".into()),
                Event::done(),
            ],
        );
        assert_eq!(chunks[0].role, Some(Role::Assistant));
        assert_eq!(
            contents(&chunks),
            vec![REASONING_OPEN, REASONING_CLOSE, REASONING_SEPARATOR, "42"]
        );
        let last = chunks.last().unwrap();
        assert!(last.is_final());
        assert!(!last.has_text());
        assert_eq!(last.finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.meta, Some(meta()));
    }

    #[test]
    fn test_field_format_drops_markers() {
        let chunks = drive(
            ReasoningFormat::Field,
            vec![Event::Reasoning("hmm".into()), Event::Answer("yes".into())],
        );
        let reasoning: Vec<&str> = chunks
            .iter()
            .filter_map(|c| c.reasoning_delta.as_deref())
            .collect();
        assert_eq!(reasoning, vec!["hmm"]);
        assert_eq!(contents(&chunks), vec!["yes"]);
    }

    #[test]
    fn test_cards_trail_the_text() {
        let card = serde_json::json!({
            "cardInfo": {"cardItems": [
                {"type": "2002", "content": "[{\"name\":\"Tokio\",\"url\":\"https://tokio.rs\"}]"}
            ]}
        })
        .to_string();
        let chunks = drive(
            ReasoningFormat::Inline,
            vec![
                Event::Answer("a".into()),
                Event::Card(card.clone()),
                Event::Answer("b".into()),
                Event::Card(card),
            ],
        );
        assert_eq!(contents(&chunks), vec!["a", "b"]);
        let card_chunks: Vec<&OutputChunk> =
            chunks.iter().filter(|c| c.card_markdown.is_some()).collect();
        assert_eq!(card_chunks.len(), 1);
        assert_eq!(
            card_chunks[0].card_markdown.as_deref(),
            Some("\n\n---\n\n[1] [Tokio](https://tokio.rs)\n")
        );
        // card chunk sits just before the final chunk
        assert!(chunks[chunks.len() - 2].card_markdown.is_some());
    }

    #[test]
    fn test_done_carries_finish_reason_and_usage() {
        let chunks = drive(
            ReasoningFormat::Inline,
            vec![
                Event::Answer("Hi".into()),
                Event::Done {
                    finish_reason: Some("length".into()),
                    usage: Some(Usage::new(2, 3)),
                },
            ],
        );
        let last = chunks.last().unwrap();
        assert_eq!(last.finish_reason.as_deref(), Some("length"));
        assert_eq!(last.usage, Some(Usage::new(2, 3)));
    }

    #[test]
    fn test_error_event_fails() {
        let mut emitter = ChunkEmitter::new(ReasoningFormat::Inline);
        match emitter.on_event(Event::Error("quota".into())) {
            Err(e) => assert!(matches!(e.inner, PrismError::UpstreamStream(_))),
            Ok(chunks) => panic!("Expected error, got {:?}", chunks),
        }
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut emitter = ChunkEmitter::new(ReasoningFormat::Inline);
        assert!(!emitter.finish(meta()).is_empty());
        assert!(emitter.finish(meta()).is_empty());
    }

    #[test]
    fn test_aggregated_response() {
        let chunks = drive(
            ReasoningFormat::Field,
            vec![
                Event::Reasoning("a".into()),
                Event::Reasoning("b".into()),
                Event::Answer("c".into()),
            ],
        );
        let mut agg = ResponseAggregator::new();
        for chunk in chunks {
            agg.push(chunk);
        }
        let completion = agg.into_completion(&ResponseEnvelope::new("DeepSeek-R1")).unwrap();
        let message = &completion.choices[0].message;
        assert_eq!(completion.object, "chat.completion");
        assert_eq!(message.content, "c");
        assert_eq!(
            message.reasoning_content.as_deref(),
            Some("<think>\n\nab\n</think>")
        );
        assert_eq!(message.meta, Some(meta()));
        assert_eq!(completion.choices[0].finish_reason, "stop");
    }

    #[test]
    fn test_aggregated_without_reasoning_omits_field() {
        let chunks = drive(ReasoningFormat::Field, vec![Event::Answer("Hi".into())]);
        let mut agg = ResponseAggregator::new();
        for chunk in chunks {
            agg.push(chunk);
        }
        let completion = agg.into_completion(&ResponseEnvelope::new("qwen-qwq")).unwrap();
        assert_eq!(completion.choices[0].message.content, "Hi");
        assert!(completion.choices[0].message.reasoning_content.is_none());
    }

    #[test]
    fn test_aggregation_without_final_chunk_fails() {
        let mut agg = ResponseAggregator::new();
        agg.push(OutputChunk::role(Role::Assistant));
        agg.push(OutputChunk::content("Hi"));
        assert!(!agg.is_finished());
        match agg.into_completion(&ResponseEnvelope::new("qwen-qwq")) {
            Err(e) => assert!(matches!(e.inner, PrismError::Internal(_, _))),
            Ok(c) => panic!("Expected truncated stream to fail, got {:?}", c),
        }
    }
}

use crate::constants::{REASONING_CLOSE, REASONING_OPEN, REASONING_SEPARATOR};
use crate::types::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    NotStarted,
    Reasoning,
    Answered,
}

/// One piece of segmented text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Marker(&'static str),
    Reasoning(String),
    Answer(String),
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Marker(m) => m,
            Segment::Reasoning(t) | Segment::Answer(t) => t,
        }
    }
}

/// Wraps reasoning text in a single delimited block ahead of the answer.
///
/// The open marker is emitted on the first reasoning event and the close
/// marker (plus separator) on the first answer event after it. Markers are
/// emitted even when the triggering event carries empty text.
#[derive(Debug, Default)]
pub struct ReasoningSegmenter {
    phase: Phase,
}

impl ReasoningSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn push(&mut self, event: &Event) -> Vec<Segment> {
        let mut out = Vec::new();
        match event {
            Event::Reasoning(text) => {
                if self.phase == Phase::NotStarted {
                    self.phase = Phase::Reasoning;
                    out.push(Segment::Marker(REASONING_OPEN));
                }
                if !text.is_empty() {
                    out.push(Segment::Reasoning(text.clone()));
                }
            }
            Event::Answer(text) => {
                match self.phase {
                    Phase::Reasoning => out.extend(Self::closing()),
                    Phase::NotStarted | Phase::Answered => {}
                }
                self.phase = Phase::Answered;
                if !text.is_empty() {
                    out.push(Segment::Answer(text.clone()));
                }
            }
            Event::Card(_) | Event::Done { .. } | Event::Error(_) => {}
        }
        out
    }

    /// Close a reasoning block the stream never answered.
    pub fn finish(&mut self) -> Vec<Segment> {
        if self.phase == Phase::Reasoning {
            self.phase = Phase::Answered;
            return Self::closing();
        }
        Vec::new()
    }

    fn closing() -> Vec<Segment> {
        vec![
            Segment::Marker(REASONING_CLOSE),
            Segment::Marker(REASONING_SEPARATOR),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[Event]) -> Vec<Segment> {
        let mut seg = ReasoningSegmenter::new();
        events.iter().flat_map(|e| seg.push(e)).collect()
    }

    #[test]
    fn test_markers_wrap_reasoning_once() {
        let out = run(&[
            Event::Reasoning("a".into()),
            Event::Reasoning("b".into()),
            Event::Answer("c".into()),
            Event::Answer("d".into()),
        ]);
        assert_eq!(
            out,
            vec![
                Segment::Marker(REASONING_OPEN),
                Segment::Reasoning("a".into()),
                Segment::Reasoning("b".into()),
                Segment::Marker(REASONING_CLOSE),
                Segment::Marker(REASONING_SEPARATOR),
                Segment::Answer("c".into()),
                Segment::Answer("d".into()),
            ]
        );
    }

    #[test]
    fn test_answer_only_has_no_markers() {
        let out = run(&[Event::Answer("hello".into()), Event::Answer(" world".into())]);
        assert_eq!(
            out,
            vec![Segment::Answer("hello".into()), Segment::Answer(" world".into())]
        );
    }

    #[test]
    fn test_late_reasoning_after_answer_is_plain() {
        let mut seg = ReasoningSegmenter::new();
        seg.push(&Event::Answer("x".into()));
        assert_eq!(seg.push(&Event::Reasoning("y".into())), vec![Segment::Reasoning("y".into())]);
        assert_eq!(seg.phase(), Phase::Answered);
    }

    #[test]
    fn test_empty_texts_still_toggle_markers() {
        let out = run(&[
            Event::Reasoning(String::new()),
            Event::Answer("42".into()),
        ]);
        let texts: Vec<&str> = out.iter().map(|s| s.text()).collect();
        assert_eq!(texts, vec![REASONING_OPEN, REASONING_CLOSE, REASONING_SEPARATOR, "42"]);
    }

    #[test]
    fn test_cards_and_done_leave_phase_alone() {
        let mut seg = ReasoningSegmenter::new();
        seg.push(&Event::Reasoning("r".into()));
        assert!(seg.push(&Event::Card("{}".into())).is_empty());
        assert!(seg.push(&Event::done()).is_empty());
        assert!(seg.push(&Event::Error("boom".into())).is_empty());
        assert_eq!(seg.phase(), Phase::Reasoning);
    }

    #[test]
    fn test_finish_closes_open_block() {
        let mut seg = ReasoningSegmenter::new();
        seg.push(&Event::Reasoning("r".into()));
        assert_eq!(
            seg.finish(),
            vec![
                Segment::Marker(REASONING_CLOSE),
                Segment::Marker(REASONING_SEPARATOR)
            ]
        );
        assert!(seg.finish().is_empty());
    }
}

//! C9 — renders lifecycle events onto an SSE wire and assigns the
//! per-session monotonically increasing sequence numbers.
//!
//! Wire format grounded on the spec's `event: <type>\ndata: <json>\n\n`
//! framing (SPEC_FULL.md §4.9); delivery uses axum's own
//! `response::sse::Event`/`Sse` wrapper, which produces exactly that
//! framing, rather than hand-rolling byte buffers — the teacher's stack
//! already depends on `axum`.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::response::sse::Event as AxumEvent;
use chrono::Utc;

use super::types::{SseEvent, SseEventKind};

/// Per-session strictly-increasing sequence counter, starting at 1
/// (SPEC_FULL.md §8 testable property 6).
#[derive(Default)]
pub struct EventSequencer {
    next: AtomicU64,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

pub fn build_event(sequencer: &EventSequencer, kind: SseEventKind, message: impl Into<String>) -> SseEvent {
    SseEvent { kind, timestamp: Utc::now(), sequence: sequencer.next(), message: message.into() }
}

/// Renders the literal wire bytes for one event — used by tests and by
/// any non-axum transport; the axum route uses `to_axum_event` instead,
/// which produces an equivalent frame through the framework's own writer.
pub fn render_frame(event: &SseEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("event: {}\ndata: {}\n\n", event.kind.type_name(), data)
}

pub fn to_axum_event(event: &SseEvent) -> Result<AxumEvent, Infallible> {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Ok(AxumEvent::default().event(event.kind.type_name()).data(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::types::SseEventKind;

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let seq = EventSequencer::new();
        let e1 = build_event(&seq, SseEventKind::Started { query: "q".into() }, "started");
        let e2 = build_event(&seq, SseEventKind::WebSearching { message: "m".into() }, "searching");
        assert_eq!(e1.sequence, 1);
        assert_eq!(e2.sequence, 2);
    }

    #[test]
    fn render_frame_matches_wire_format() {
        let seq = EventSequencer::new();
        let event = build_event(&seq, SseEventKind::Started { query: "q".into() }, "started");
        let frame = render_frame(&event);
        assert!(frame.starts_with("event: started\ndata: "));
        assert!(frame.ends_with("\n\n"));
    }
}

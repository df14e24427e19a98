//! Incremental decoder for chat-completion event streams.
//!
//! Bytes arrive in arbitrary chunks. The decoder turns them into text with a
//! stateful UTF-8 decoder, keeps a carry-over buffer of text that does not yet
//! form a complete line, and turns each complete `data:` line into a content
//! delta.
//!
//! A `data:` line whose payload does not parse as JSON is put back at the front
//! of the carry-over buffer and the rest of the chunk is left alone until more
//! bytes arrive (`FrameDeferred`). The deferred line gets exactly one retry; a
//! line that still fails is dropped and logged. Nothing partial is ever
//! surfaced as a delta.

use crate::constants::{SSE_DATA_PREFIX, SSE_DONE};
use crate::specs::openai::StreamPulse;
use crate::str_utils::Utf8Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental fragment of assistant text.
    Delta(String),
    /// The `[DONE]` terminator was seen.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for a complete line.
    Accumulating,
    /// A complete line has been taken off the buffer and is being handled.
    LineReady,
    /// A line failed to parse and sits at the front of the buffer again.
    FrameDeferred,
    /// `[DONE]` seen or input finished; further bytes are ignored.
    Finished,
}

/// How a single line of the stream is treated.
#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    Ignored,
    Done,
    Data(&'a str),
}

fn classify(line: &str) -> LineKind<'_> {
    if line.trim().is_empty() || line.starts_with(':') {
        return LineKind::Ignored;
    }
    let Some(rest) = line.strip_prefix(SSE_DATA_PREFIX) else {
        return LineKind::Ignored;
    };
    let payload = rest.trim();
    if payload == SSE_DONE {
        LineKind::Done
    } else {
        LineKind::Data(payload)
    }
}

#[derive(Debug)]
pub struct DeltaDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    state: DecoderState,
    dropped_frames: usize,
}

impl Default for DeltaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self {
            utf8: Utf8Decoder::new(),
            buffer: String::new(),
            state: DecoderState::Accumulating,
            dropped_frames: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Text received but not yet consumed as a complete line.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Lines dropped after failing to parse on their retry.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    pub fn is_finished(&self) -> bool {
        self.state == DecoderState::Finished
    }

    /// Feeds one chunk of the response body.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.is_finished() {
            return Vec::new();
        }
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);
        let retrying = self.state == DecoderState::FrameDeferred;
        self.drain_lines(retrying, false)
    }

    /// Signals end of input. The trailing line, if any, is processed as if it
    /// were terminated; lines that still fail to parse are dropped.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.is_finished() {
            return Vec::new();
        }
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        if !self.buffer.is_empty() && !self.buffer.ends_with('\n') {
            self.buffer.push('\n');
        }
        let events = self.drain_lines(false, true);
        self.buffer.clear();
        self.state = DecoderState::Finished;
        events
    }

    fn drain_lines(&mut self, mut retrying: bool, final_pass: bool) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        while let Some(idx) = self.buffer.find('\n') {
            self.state = DecoderState::LineReady;
            let mut line: String = self.buffer.drain(..=idx).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }

            // Only the first line of a chunk can be the deferred one.
            let is_retry = std::mem::take(&mut retrying);

            let payload = match classify(&line) {
                LineKind::Ignored => continue,
                LineKind::Done => {
                    self.buffer.clear();
                    self.state = DecoderState::Finished;
                    events.push(StreamEvent::Done);
                    return events;
                }
                LineKind::Data(payload) => payload,
            };

            match serde_json::from_str::<StreamPulse>(payload) {
                Ok(pulse) => {
                    if let Some(delta) = pulse.content_delta() {
                        if !delta.is_empty() {
                            events.push(StreamEvent::Delta(delta));
                        }
                    }
                }
                Err(e) if is_retry || final_pass => {
                    self.dropped_frames += 1;
                    tracing::warn!(
                        "[☁️  -> 📱] Dropping unparseable frame ({} chars): {}",
                        line.len(),
                        e
                    );
                }
                Err(e) => {
                    tracing::debug!("[☁️  -> 📱] Deferring incomplete frame: {}", e);
                    line.push('\n');
                    self.buffer.insert_str(0, &line);
                    self.state = DecoderState::FrameDeferred;
                    return events;
                }
            }
        }

        self.state = DecoderState::Accumulating;
        events
    }
}

/// Append-only accumulator for the assistant message being streamed.
#[derive(Debug, Clone)]
pub struct AssistantDraft {
    id: String,
    buffer: String,
}

impl AssistantDraft {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            buffer: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn append(&mut self, delta: &str) {
        self.buffer.push_str(delta);
    }

    pub fn content(&self) -> &str {
        &self.buffer
    }

    pub fn into_content(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), LineKind::Ignored);
        assert_eq!(classify("   "), LineKind::Ignored);
        assert_eq!(classify(": keepalive"), LineKind::Ignored);
        assert_eq!(classify("event: message"), LineKind::Ignored);
        assert_eq!(classify("data: [DONE]"), LineKind::Done);
        assert_eq!(classify("data:{\"a\":1}"), LineKind::Data("{\"a\":1}"));
        assert_eq!(classify("data:  {\"a\":1}  "), LineKind::Data("{\"a\":1}"));
    }

    #[test]
    fn test_partial_line_stays_in_buffer() {
        let mut d = DeltaDecoder::new();
        let events = d.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: {\"cho");
        assert_eq!(events, vec![StreamEvent::Delta("Hi".into())]);
        assert_eq!(d.pending(), "data: {\"cho");
        assert_eq!(d.state(), DecoderState::Accumulating);
    }

    #[test]
    fn test_malformed_line_is_deferred_then_dropped() {
        let mut d = DeltaDecoder::new();
        let events = d.feed(b"data: {\"choices\":\ndata: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n");
        assert!(events.is_empty());
        assert_eq!(d.state(), DecoderState::FrameDeferred);
        assert!(d.pending().starts_with("data: {\"choices\":\n"));

        let events = d.feed(b"\n");
        assert_eq!(events, vec![StreamEvent::Delta("a".into())]);
        assert_eq!(d.dropped_frames(), 1);
        assert_eq!(d.state(), DecoderState::Accumulating);
    }

    #[test]
    fn test_done_ignores_later_bytes() {
        let mut d = DeltaDecoder::new();
        let events = d.feed(b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n");
        assert_eq!(events, vec![StreamEvent::Done]);
        assert!(d.is_finished());
        assert!(d.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n").is_empty());
        assert!(d.finish().is_empty());
    }

    #[test]
    fn test_finish_processes_unterminated_tail() {
        let mut d = DeltaDecoder::new();
        assert!(d.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}").is_empty());
        assert_eq!(d.finish(), vec![StreamEvent::Delta("end".into())]);
        assert!(d.is_finished());
    }

    #[test]
    fn test_draft_is_append_only() {
        let mut draft = AssistantDraft::new("a1");
        draft.append("Hel");
        draft.append("lo");
        assert_eq!(draft.id(), "a1");
        assert_eq!(draft.content(), "Hello");
        assert_eq!(draft.into_content(), "Hello");
    }
}

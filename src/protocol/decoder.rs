//! Incremental SSE frame reassembly and typed event decoding.
//!
//! The transport delivers arbitrary byte chunks; frames are only complete at a
//! blank line. Partial frames are buffered, never dropped. A malformed frame
//! is skipped with a warning so one bad payload cannot lose the rest of the
//! run.

use super::events::{now_unix_millis, AgUiEvent, RawEvent};
use crate::error::DecodeError;
use serde_json::Value;
use tracing::{debug, warn};

/// Incremental parser for the SSE wire format.
///
/// The SSE spec allows events to contain multiple `data:` lines; payload lines
/// are joined with `\n` and finalized when a blank line is encountered.
/// Comment lines (leading `:`) and non-`data` fields are ignored.
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    /// Bytes received after the last complete line.
    pending_line: String,
    /// `data:` payload lines of the frame currently being assembled.
    data_lines: Vec<String>,
}

impl SseFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns every frame payload completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut payloads = Vec::new();
        for ch in chunk.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.pending_line);
                if let Some(payload) = self.accept_line(&line) {
                    payloads.push(payload);
                }
            } else {
                self.pending_line.push(ch);
            }
        }
        payloads
    }

    /// Finish the stream, flushing any frame that was never blank-line
    /// terminated. Returns the trailing payload when one exists.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending_line);
        if !line.is_empty() {
            self.accept_line(&line);
        }
        self.flush_frame()
    }

    fn accept_line(&mut self, raw_line: &str) -> Option<String> {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() {
            return self.flush_frame();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = if let Some((field, value)) = line.split_once(':') {
            (field, value.strip_prefix(' ').unwrap_or(value))
        } else {
            (line, "")
        };
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        None
    }

    fn flush_frame(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(payload)
    }
}

/// Decode one complete frame payload into a typed event.
///
/// Validates the required fields per type tag; a frame that is not valid JSON
/// or carries an unrecognized tag fails here and is dropped by the caller.
pub fn decode_frame(payload: &str) -> Result<AgUiEvent, DecodeError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| DecodeError::Malformed(format!("invalid JSON frame: {err}")))?;
    let Some(tag) = value.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::MissingType);
    };
    let tag = tag.to_string();
    serde_json::from_value(value)
        .map_err(|err| DecodeError::UnrecognizedEvent(format!("{tag}: {err}")))
}

/// Stateful decoder producing ordered [`RawEvent`]s from transport chunks.
///
/// Wraps [`SseFrameBuffer`], assigns monotonic sequence numbers and receipt
/// timestamps, and skips malformed frames without aborting.
#[derive(Debug, Default)]
pub struct EventDecoder {
    frames: SseFrameBuffer,
    /// Trailing bytes of an incomplete UTF-8 sequence, carried to the next
    /// chunk. Chunk boundaries may split a multi-byte character.
    utf8_tail: Vec<u8>,
    next_seq: u64,
    dropped_frames: u64,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of frames dropped as malformed since construction.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Feed one transport chunk; returns the events it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        self.utf8_tail.extend_from_slice(chunk);
        let text = take_complete_utf8(&mut self.utf8_tail);
        let payloads = self.frames.feed(&text);
        self.decode_payloads(payloads)
    }

    /// Flush the trailing unterminated frame at end of stream, if any.
    pub fn finish(&mut self) -> Vec<RawEvent> {
        let mut payloads = Vec::new();
        if !self.utf8_tail.is_empty() {
            // A stream ending inside a character is truncated; replace.
            let text = String::from_utf8_lossy(&self.utf8_tail).into_owned();
            self.utf8_tail.clear();
            payloads.extend(self.frames.feed(&text));
        }
        payloads.extend(self.frames.finish());
        self.decode_payloads(payloads)
    }

    fn decode_payloads(&mut self, payloads: Vec<String>) -> Vec<RawEvent> {
        let mut events = Vec::new();
        for payload in payloads {
            let trimmed = payload.trim();
            if trimmed.is_empty() || trimmed == "[DONE]" {
                debug!("skipping stream sentinel frame");
                continue;
            }
            match decode_frame(trimmed) {
                Ok(event) => {
                    let timestamp_ms = wire_timestamp(trimmed).unwrap_or_else(now_unix_millis);
                    let seq = self.next_seq;
                    self.next_seq = self.next_seq.saturating_add(1);
                    events.push(RawEvent::new(seq, timestamp_ms, event));
                }
                Err(err) => {
                    self.dropped_frames = self.dropped_frames.saturating_add(1);
                    warn!(error = %err, "dropping malformed protocol frame");
                }
            }
        }
        events
    }
}

/// Split the decodable prefix of `buf` off as a `String`, leaving an
/// incomplete trailing UTF-8 sequence in place for the next chunk. Bytes that
/// are invalid outright (not merely incomplete) are replaced.
fn take_complete_utf8(buf: &mut Vec<u8>) -> String {
    match std::str::from_utf8(buf) {
        Ok(text) => {
            let text = text.to_string();
            buf.clear();
            text
        }
        Err(err) if err.error_len().is_none() => {
            let valid = err.valid_up_to();
            let text = String::from_utf8_lossy(&buf[..valid]).into_owned();
            buf.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(buf).into_owned();
            buf.clear();
            text
        }
    }
}

/// Extract the optional wire-level `timestamp` field (unix millis).
fn wire_timestamp(payload: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value.get("timestamp").and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{sse_data_block, sse_event_block};

    #[test]
    fn frame_buffer_joins_data_lines_and_skips_comments() {
        let mut buffer = SseFrameBuffer::new();
        let payloads = buffer.feed(
            ": ping\n\
             event: demo\n\
             data: one\n\
             data: two\n\
             id: 1\n\
             \n\
             data: [DONE]\n\
             \n",
        );
        assert_eq!(payloads, vec!["one\ntwo".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn frame_buffer_holds_partial_frames_across_chunks() {
        let mut buffer = SseFrameBuffer::new();
        assert!(buffer.feed("data: {\"ty").is_empty());
        assert!(buffer.feed("pe\":\"X\"}\n").is_empty());
        let payloads = buffer.feed("\n");
        assert_eq!(payloads, vec!["{\"type\":\"X\"}".to_string()]);
    }

    #[test]
    fn frame_buffer_finish_flushes_unterminated_frame() {
        let mut buffer = SseFrameBuffer::new();
        assert!(buffer.feed("data: tail").is_empty());
        assert_eq!(buffer.finish(), Some("tail".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn frame_buffer_handles_crlf_line_endings() {
        let mut buffer = SseFrameBuffer::new();
        let payloads = buffer.feed("data: one\r\n\r\n");
        assert_eq!(payloads, vec!["one".to_string()]);
    }

    #[test]
    fn decoder_yields_typed_events_in_order() {
        let mut decoder = EventDecoder::new();
        let stream = format!(
            "{}{}",
            sse_data_block(r#"{"type":"RUN_STARTED","threadId":"t1","runId":"r1"}"#),
            sse_data_block(r#"{"type":"TEXT_MESSAGE_START","messageId":"m1","role":"assistant"}"#),
        );
        let events = decoder.feed(stream.as_bytes());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
        assert_eq!(events[0].event.kind(), "RUN_STARTED");
        assert_eq!(events[1].event.kind(), "TEXT_MESSAGE_START");
        assert!(events[0].timestamp_ms > 0);
    }

    #[test]
    fn decoder_skips_malformed_frame_and_continues() {
        let mut decoder = EventDecoder::new();
        let stream = format!(
            "{}{}{}",
            sse_data_block("not json at all"),
            sse_data_block(r#"{"type":"WHAT_IS_THIS"}"#),
            sse_data_block(r#"{"type":"RUN_FINISHED"}"#),
        );
        let events = decoder.feed(stream.as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.kind(), "RUN_FINISHED");
        assert_eq!(decoder.dropped_frames(), 2);
    }

    #[test]
    fn decoder_prefers_wire_timestamp_when_present() {
        let mut decoder = EventDecoder::new();
        let stream = sse_data_block(r#"{"type":"RUN_FINISHED","timestamp":1234}"#);
        let events = decoder.feed(stream.as_bytes());
        assert_eq!(events[0].timestamp_ms, 1234);
    }

    #[test]
    fn decoder_ignores_done_sentinel() {
        let mut decoder = EventDecoder::new();
        let events = decoder.feed(b"data: [DONE]\n\n");
        assert!(events.is_empty());
        assert_eq!(decoder.dropped_frames(), 0);
    }

    #[test]
    fn decoder_finish_recovers_trailing_frame() {
        let mut decoder = EventDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":\"RUN_FINISHED\"}\n").is_empty());
        let events = decoder.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.kind(), "RUN_FINISHED");
    }

    #[test]
    fn decoder_handles_event_field_prefixed_frames() {
        let mut decoder = EventDecoder::new();
        let stream = sse_event_block(
            "message",
            r#"{"type":"TEXT_MESSAGE_END","messageId":"m1"}"#,
        );
        let events = decoder.feed(stream.as_bytes());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn decoder_reassembles_multibyte_chars_split_across_chunks() {
        let frame = sse_data_block(
            r#"{"type":"TEXT_MESSAGE_CONTENT","messageId":"m1","delta":"café ☕"}"#,
        );
        let bytes = frame.as_bytes();
        // Every split point, including mid-character ones.
        for split in 1..bytes.len() {
            let mut decoder = EventDecoder::new();
            let mut events = decoder.feed(&bytes[..split]);
            events.extend(decoder.feed(&bytes[split..]));
            assert_eq!(events.len(), 1, "split at {split}");
            let AgUiEvent::TextMessageContent { delta, .. } = &events[0].event else {
                panic!("expected text content at split {split}");
            };
            assert_eq!(delta, "café ☕", "split at {split}");
        }
    }

    #[test]
    fn decoder_tolerates_invalid_bytes_without_stalling() {
        let mut decoder = EventDecoder::new();
        // 0xFF can never start a UTF-8 sequence; it must not be held back.
        let mut stream = b"data: ".to_vec();
        stream.push(0xFF);
        stream.extend_from_slice(b"\n\n");
        stream.extend_from_slice(sse_data_block(r#"{"type":"RUN_FINISHED"}"#).as_bytes());
        let events = decoder.feed(&stream);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.kind(), "RUN_FINISHED");
    }

    #[test]
    fn decode_frame_reports_missing_type_tag() {
        let err = decode_frame(r#"{"messageId":"m1"}"#).expect_err("should fail");
        assert!(matches!(err, DecodeError::MissingType));
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn frame_buffer_round_trips_data_blocks_at_any_chunking(
                payloads in proptest::collection::vec(
                    proptest::string::string_regex("[ -~]{0,24}").expect("regex"),
                    0..8
                ),
                chunk_len in 1usize..16
            ) {
                let mut stream = String::new();
                for payload in &payloads {
                    stream.push_str(": keepalive\n");
                    stream.push_str("data: ");
                    stream.push_str(payload);
                    stream.push_str("\n\n");
                }

                let mut buffer = SseFrameBuffer::new();
                let mut got = Vec::new();
                let chars: Vec<char> = stream.chars().collect();
                for chunk in chars.chunks(chunk_len) {
                    let chunk: String = chunk.iter().collect();
                    got.extend(buffer.feed(&chunk));
                }
                got.extend(buffer.finish());

                prop_assert_eq!(got, payloads);
            }
        }
    }
}

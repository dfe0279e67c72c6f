//! # Frame Assembly
//!
//! Splits a raw incoming byte stream into complete event frames, tolerating
//! arbitrary split points. Frames follow the Server-Sent-Events shape:
//!
//! ```text
//! event: <type>\n
//! data: <json>\n
//! \n
//! ```
//!
//! ## Key Guarantees:
//! - **No byte loss**: partial chunks are buffered across calls, including a
//!   multi-byte UTF-8 sequence split mid-character
//! - **Split invariance**: any chunking of the same bytes yields the same frames
//! - **No partial frames**: a segment missing the event type or a decodable
//!   payload is dropped (logged, not surfaced); leftover buffer content is
//!   discarded on stream end, never force-flushed

use serde_json::Value;
use tracing::debug;

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";
const END_MARKER: &str = "[DONE]";
const FRAME_DELIMITER: &str = "\n\n";

/// One complete event unit recovered from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Event type from the `event:` line
    pub event_type: String,

    /// Decoded JSON payload from the `data:` line
    pub data: Value,
}

/// Incremental frame assembler for one stream.
///
/// Owns its buffers exclusively; they reset only on [`finish`](Self::finish)
/// or when the assembler is dropped with the stream. The produced frame
/// sequence is finite and non-restartable.
pub struct FrameAssembler {
    /// Decoded text waiting for a complete frame delimiter
    buffer: String,

    /// Undecoded tail bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,

    /// Complete frames produced so far
    assembled: u64,

    /// Partially-formed segments discarded so far
    dropped: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
            assembled: 0,
            dropped: 0,
        }
    }

    /// Feed the next network chunk and collect every frame it completes.
    ///
    /// Callable repeatedly with partial chunks; the trailing (possibly
    /// incomplete) segment is retained as the new buffer.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.decode_text(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find(FRAME_DELIMITER) {
            let segment: String = self.buffer.drain(..pos + FRAME_DELIMITER.len()).collect();
            let segment = &segment[..pos];

            if segment.trim().is_empty() {
                continue;
            }

            match parse_segment(segment) {
                Some(frame) => {
                    self.assembled += 1;
                    frames.push(frame);
                }
                None => {
                    self.dropped += 1;
                    debug!(segment_len = segment.len(), "Dropping partially-formed segment");
                }
            }
        }
        frames
    }

    /// Append the chunk to the text buffer, carrying UTF-8 boundary state.
    ///
    /// An incomplete trailing sequence waits for the next chunk; an invalid
    /// sequence decodes as U+FFFD so one bad byte cannot stall the stream.
    fn decode_text(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.pending);
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            self.buffer.push('\u{FFFD}');
                            rest = &rest[valid + len..];
                        }
                        None => {
                            // Incomplete sequence at the tail: keep for next call
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// End the stream, discarding any leftover buffer content.
    pub fn finish(&mut self) {
        if !self.buffer.trim().is_empty() || !self.pending.is_empty() {
            debug!(
                leftover_chars = self.buffer.len(),
                leftover_bytes = self.pending.len(),
                "Discarding incomplete frame at stream end"
            );
        }
        self.buffer.clear();
        self.pending.clear();
    }

    /// Complete frames produced over the assembler's lifetime.
    pub fn assembled(&self) -> u64 {
        self.assembled
    }

    /// Partially-formed segments discarded over the assembler's lifetime.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one complete segment into a frame.
///
/// Yields a frame only if both the event type and a decoded payload are
/// present. The literal `[DONE]` token means "no payload", not an error; a
/// data line that fails to decode is logged and treated the same way.
fn parse_segment(segment: &str) -> Option<Frame> {
    let mut event_type = String::new();
    let mut data: Option<Value> = None;

    for line in segment.split('\n') {
        if let Some(rest) = line.strip_prefix(EVENT_PREFIX) {
            event_type = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            let payload = rest.trim();
            if payload.is_empty() || payload == END_MARKER {
                continue;
            }
            match serde_json::from_str(payload) {
                Ok(value) => data = Some(value),
                Err(err) => {
                    debug!(error = %err, "Failed to parse frame data line");
                }
            }
        }
    }

    if event_type.is_empty() {
        return None;
    }
    data.map(|data| Frame { event_type, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STREAM: &str = "event: message_start\ndata: {\"message\":{\"id\":\"m1\"}}\n\nevent: content_block\ndata: {\"state\":\"delta\",\"data\":{\"text\":\"Hi\"}}\n\n";

    #[test]
    fn test_single_chunk() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.feed(STREAM.as_bytes());

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_type, "message_start");
        assert_eq!(frames[0].data["message"]["id"], json!("m1"));
        assert_eq!(frames[1].event_type, "content_block");
        assert_eq!(frames[1].data["data"]["text"], json!("Hi"));
    }

    #[test]
    fn test_split_mid_frame() {
        // Two calls split in the middle of the second frame
        let bytes = STREAM.as_bytes();
        let split = bytes.len() - 20;

        let mut assembler = FrameAssembler::new();
        let mut frames = assembler.feed(&bytes[..split]);
        frames.extend(assembler.feed(&bytes[split..]));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].data["data"]["text"], json!("Hi"));
    }

    #[test]
    fn test_split_invariance() {
        // Any chunking must produce the same frames as a single feed
        let bytes = STREAM.as_bytes();
        let mut whole = FrameAssembler::new();
        let expected = whole.feed(bytes);

        for chunk_size in [1, 2, 3, 7, 16, 64] {
            let mut assembler = FrameAssembler::new();
            let mut frames = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                frames.extend(assembler.feed(chunk));
            }
            assert_eq!(frames, expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_multibyte_utf8_split_across_calls() {
        // "é" is two bytes; split between them
        let stream = "event: content_block\ndata: {\"state\":\"delta\",\"data\":{\"text\":\"é\"}}\n\n";
        let bytes = stream.as_bytes();
        let split = stream.find('\u{e9}').unwrap() + 1; // inside the two-byte sequence

        let mut assembler = FrameAssembler::new();
        let mut frames = assembler.feed(&bytes[..split]);
        frames.extend(assembler.feed(&bytes[split..]));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data["data"]["text"], json!("é"));
    }

    #[test]
    fn test_missing_event_type_dropped() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.feed(b"data: {\"text\":\"orphan\"}\n\n");
        assert!(frames.is_empty());
        assert_eq!(assembler.dropped(), 1);
    }

    #[test]
    fn test_missing_data_dropped() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.feed(b"event: message_stop\n\n");
        assert!(frames.is_empty());
        assert_eq!(assembler.dropped(), 1);
    }

    #[test]
    fn test_done_marker_is_no_payload() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.feed(b"event: message_stop\ndata: [DONE]\n\n");
        // [DONE] is not an error, but without a payload the segment yields nothing
        assert!(frames.is_empty());
    }

    #[test]
    fn test_malformed_json_dropped_silently() {
        let mut assembler = FrameAssembler::new();
        let mut frames = assembler.feed(b"event: usage_metadata\ndata: {not json}\n\n");
        assert!(frames.is_empty());

        // The stream keeps working afterwards
        frames.extend(assembler.feed(b"event: message_stop\ndata: {\"ok\":true}\n\n"));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_trailing_segment_retained_until_complete() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.feed(b"event: message_start\ndata: {\"a\":1}");
        assert!(frames.is_empty());

        let frames = assembler.feed(b"\n\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_finish_discards_leftovers() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(b"event: message_start\ndata: {\"a\":1}");
        assembler.finish();

        // The held partial frame must not resurface
        let frames = assembler.feed(b"\n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn test_last_data_line_wins() {
        let mut assembler = FrameAssembler::new();
        let frames =
            assembler.feed(b"event: usage_metadata\ndata: {\"n\":1}\ndata: {\"n\":2}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data["n"], json!(2));
    }
}

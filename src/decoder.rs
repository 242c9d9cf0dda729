//! Frame decoding for both transport channels.
//!
//! The persistent channel delivers one JSON frame per message, decoded with
//! [`decode_frame`]. The one-shot channel delivers a byte stream of
//! event-prefixed lines which [`LineDecoder`] reassembles across reads.
//!
//! Decoding never fails past this module: malformed input is logged and
//! skipped so one bad frame cannot end a stream.
//!
//! ```text
//! bytes ──> LineDecoder ──(complete line)──> strip "data:" ──> decode_frame ──> ProtocolEvent
//!              │
//!              └── partial line kept until the next read
//! ```

use crate::constants::{EVENT_PREFIX, MAX_PENDING_LINE};
use crate::protocol::{ProtocolEvent, WireFrame};

/// Why a single frame or line could not be decoded.
#[derive(Debug)]
pub enum DecodeError {
    /// The line was not valid UTF-8.
    InvalidUtf8(std::str::Utf8Error),
    /// The frame was not a JSON object of the expected shape.
    Malformed(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUtf8(e) => write!(f, "invalid UTF-8 in frame: {e}"),
            Self::Malformed(e) => write!(f, "malformed frame: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode one frame, distinguishing malformed input from unknown types.
///
/// Returns `Ok(None)` for a well-formed frame whose `type` is not one of
/// `status`, `chunk`, `complete`, `error`.
pub fn try_decode_frame(text: &str) -> Result<Option<ProtocolEvent>, DecodeError> {
    let frame: WireFrame = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let kind = frame.kind.clone();
    let event = frame.into_event();
    if event.is_none() {
        log::trace!("[FrameDecoder] Ignoring frame with unknown type '{}'", kind);
    }
    Ok(event)
}

/// Decode one frame from the persistent channel.
///
/// Malformed frames and unknown types both yield `None`.
pub fn decode_frame(text: &str) -> Option<ProtocolEvent> {
    match try_decode_frame(text) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("[FrameDecoder] Skipping frame: {}", e);
            None
        }
    }
}

/// Incremental decoder for an event-prefixed streaming body.
///
/// Buffers raw bytes, so both a multi-byte character and a whole event may be
/// split across reads. Only complete lines are decoded; call
/// [`finish`](Self::finish) when the body ends to flush a final line that had
/// no trailing newline.
///
/// A partial line longer than the configured limit is dropped and counted as
/// skipped, along with the rest of that line when its newline arrives.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Leading bytes of `buffer` already searched for a newline.
    scanned: usize,
    max_line: usize,
    /// Dropping the remainder of an oversized line.
    discarding: bool,
    skipped: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_PENDING_LINE)
    }
}

impl LineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder that buffers at most `max_line` bytes of one line.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
            skipped: 0,
        }
    }

    /// Feed one read of the body and return every event it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ProtocolEvent> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = buffer[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            if !std::mem::take(&mut self.discarding) {
                if let Some(event) = self.decode_line(&buffer[start..end]) {
                    events.push(event);
                }
            }
            start = end + 1;
            from = start;
        }
        buffer.drain(..start);

        if buffer.len() > self.max_line {
            if !self.discarding {
                self.skipped += 1;
                log::warn!(
                    "[FrameDecoder] Dropping line longer than {} bytes",
                    self.max_line
                );
            }
            buffer.clear();
            self.discarding = true;
        }

        self.scanned = buffer.len();
        self.buffer = buffer;
        events
    }

    /// Flush the buffered tail once the body is exhausted.
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            return Vec::new();
        }
        self.decode_line(&rest).into_iter().collect()
    }

    /// Number of protocol lines skipped because they failed to decode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Bytes currently held waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<ProtocolEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            return None;
        }

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                self.skipped += 1;
                log::warn!("[FrameDecoder] Skipping line: {}", DecodeError::InvalidUtf8(e));
                return None;
            }
        };

        // Lines without the prefix (comments, `event:` fields) carry no protocol data
        let payload = line.strip_prefix(EVENT_PREFIX)?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        match try_decode_frame(payload) {
            Ok(event) => event,
            Err(e) => {
                self.skipped += 1;
                log::warn!("[FrameDecoder] Skipping line: {}", e);
                None
            }
        }
    }
}

//! The wire envelope every message travels in, and the line-framed codec
//! that turns a byte stream into a sequence of envelopes.
//!
//! Framing is `\n`-delimited JSON: one object per line, no length prefix.
//! A single malformed line is logged and dropped by the caller; only an
//! unterminated frame that exceeds the configured cap is fatal.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Every message on the wire is `{ "type": ..., "data": ..., "timestamp": ... }`.
/// The codec itself is tag-agnostic: it only knows how to split lines and
/// parse this shape. Interpreting `type` is the dispatcher's job (see
/// [`crate::messages`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_data")]
    pub data: serde_json::Value,
    pub timestamp: f64,
}

fn default_data() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Envelope {
            kind: kind.into(),
            data,
            timestamp: unix_timestamp(),
        }
    }
}

/// Seconds since the epoch, matching the reference implementation's use of
/// `time.time()` as the envelope's `timestamp` field.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Default cap on a single frame before more data arrives (§4.1).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Non-fatal: the frame parsed to a line but wasn't valid UTF-8/JSON/Envelope.
/// Logged and dropped by the caller; the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("frame is not valid utf-8: {0}")]
    InvalidUtf8(String),
    #[error("frame is not valid json: {0}")]
    MalformedJson(String),
}

/// Fatal: the buffer grew past the cap without ever seeing a newline.
#[derive(Debug, thiserror::Error)]
#[error("frame exceeded {limit} byte cap without a terminator")]
pub struct FrameTooLarge {
    pub limit: usize,
}

/// Incremental `\n`-delimited JSON decoder. Feed it raw bytes as they
/// arrive off the socket; it hands back zero or more decode results for
/// every complete line currently buffered.
pub struct Framer {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
}

impl Framer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Framer {
            buffer: Vec::new(),
            max_frame_bytes,
        }
    }

    /// Appends `bytes` to the internal buffer and pulls out every complete
    /// line now available. Returns `Err` only when the buffer has grown
    /// past the cap with no terminator in sight — the caller should close
    /// the connection in that case.
    pub fn feed(
        &mut self,
        bytes: &[u8],
    ) -> Result<Vec<Result<Envelope, FrameDecodeError>>, FrameTooLarge> {
        self.buffer.extend_from_slice(bytes);
        let mut results = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            let decoded = match std::str::from_utf8(line) {
                Ok(text) => serde_json::from_str::<Envelope>(text)
                    .map_err(|e| FrameDecodeError::MalformedJson(e.to_string())),
                Err(e) => Err(FrameDecodeError::InvalidUtf8(e.to_string())),
            };
            results.push(decoded);
        }

        if self.buffer.len() > self.max_frame_bytes {
            return Err(FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }

        Ok(results)
    }
}

/// Serializes an envelope as a single `\n`-terminated line.
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    let mut out = serde_json::to_vec(envelope).expect("Envelope serialization cannot fail");
    out.push(b'\n');
    out
}

//! Server-sent-event decoding for chat-completion delta streams.

use bytes::BytesMut;
use serde::Deserialize;

pub const DONE_SENTINEL: &str = "[DONE]";

/// Splits a byte stream into complete lines and yields the payload of each
/// `data:` line. A line split across network chunks is held until its
/// newline arrives, so multi-byte characters are never cut.
#[derive(Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    // bytes of `buffer` already known to hold no newline
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            let line = self.buffer.split_to(pos + 1);
            self.scanned = 0;
            if let Some(payload) = data_payload(&line[..pos]) {
                payloads.push(payload);
            }
        }
        self.scanned = self.buffer.len();
        payloads
    }

    /// Flushes a trailing line that was never newline-terminated.
    pub fn finish(mut self) -> Option<String> {
        let rest = self.buffer.split();
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let decoded = String::from_utf8_lossy(line);
    let line = decoded.strip_suffix('\r').unwrap_or(decoded.as_ref());
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim().is_empty() || payload.trim() == DONE_SENTINEL {
        return None;
    }
    Some(payload.to_string())
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Extracts `choices[0].delta.content`. Malformed JSON is logged and
/// yields `None`.
pub fn delta_content(payload: &str) -> Option<String> {
    match serde_json::from_str::<CompletionChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|c| !c.is_empty()),
        Err(e) => {
            tracing::warn!(payload, error = %e, "failed to parse stream line");
            None
        }
    }
}

//! Progress stream decoding for the generation and feedback capabilities.
//!
//! Both capabilities answer with `text/event-stream`; every `data:` line carries one JSON
//! event. `status` and `thinking` events are surfaced as progress, `complete` carries the
//! result and `error` aborts the attempt.

use serde::{Deserialize, Serialize};

use crate::backend_client::wire::InterviewPayload;

/// Progress reported while a generation or feedback request is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Human-readable phase label, replaces the previous one.
    Status { label: String },
    /// Incremental narrative text, appended while waiting.
    Thinking { text: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamEvent {
    Status { message: String },
    Thinking { content: String },
    Complete(InterviewPayload),
    Error { message: String },
}

/// Splits an SSE byte stream into `data:` payloads.
///
/// Bytes are buffered until a newline so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feeds a chunk and returns the payloads of every line completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(data) = parse_sse_line(String::from_utf8_lossy(&line).trim()) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        parse_sse_line(String::from_utf8_lossy(&rest).trim())
    }
}

fn parse_sse_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

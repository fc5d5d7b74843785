//! Incremental decoders for the two streaming wire formats.
//!
//! Chunks arrive at arbitrary byte boundaries. Each decoder keeps the
//! unterminated tail of the last chunk and only interprets complete lines.

use serde_json::Value;
use tracing::{trace, warn};

/// Longest unterminated line kept in memory before it is dropped.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream on `\n`, holding back the trailing partial line.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to contain no newline.
    scanned: usize,
    /// Set after an oversized line was dropped, until its newline arrives.
    discarding: bool,
    limit: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            discarding: false,
            limit,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            if self.discarding {
                self.discarding = false;
            } else {
                lines.push(decode_line(&self.pending[start..end]));
            }
            start = end + 1;
            self.scanned = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();

        if self.pending.len() > self.limit {
            warn!(bytes = self.pending.len(), limit = self.limit, "Dropping oversized stream line");
            self.pending.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        lines
    }

    /// Remaining unterminated bytes, if any.
    pub fn take_rest(&mut self) -> Option<String> {
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            self.pending.clear();
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// What one chunk produced.
#[derive(Debug, Default, PartialEq)]
pub struct Decoded {
    pub deltas: Vec<String>,
    /// The wire signalled the end of the response.
    pub done: bool,
}

pub trait FrameDecoder: Send {
    fn feed(&mut self, chunk: &[u8]) -> Decoded;

    /// Called once the transport closes.
    fn finish(&mut self) -> Decoded;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseFlavor {
    /// `content_block_delta` events carrying `delta.text`.
    Anthropic,
    /// `choices[0].delta.content`.
    OpenAi,
}

/// Event-stream decoder. `[DONE]` ends the stream without being emitted.
#[derive(Debug)]
pub struct SseDecoder {
    lines: LineBuffer,
    flavor: SseFlavor,
    done: bool,
}

impl SseDecoder {
    pub fn new(flavor: SseFlavor) -> Self {
        Self {
            lines: LineBuffer::new(),
            flavor,
            done: false,
        }
    }

    fn extract(&self, event: &Value) -> Extracted {
        match self.flavor {
            SseFlavor::Anthropic => match event.get("type").and_then(Value::as_str) {
                Some("content_block_delta") => non_empty(event.pointer("/delta/text")),
                Some("message_stop") => Extracted::End,
                _ => Extracted::Nothing,
            },
            SseFlavor::OpenAi => non_empty(event.pointer("/choices/0/delta/content")),
        }
    }

    fn line(&mut self, line: &str, out: &mut Decoded) {
        if self.done {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            out.done = true;
            return;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(event) => match self.extract(&event) {
                Extracted::Text(text) => out.deltas.push(text),
                Extracted::End => {
                    self.done = true;
                    out.done = true;
                }
                Extracted::Nothing => {}
            },
            Err(e) => trace!(error = %e, "Skipping malformed event"),
        }
    }
}

enum Extracted {
    Text(String),
    End,
    Nothing,
}

fn non_empty(value: Option<&Value>) -> Extracted {
    match value.and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Extracted::Text(s.to_string()),
        _ => Extracted::Nothing,
    }
}

impl FrameDecoder for SseDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Decoded {
        let mut out = Decoded::default();
        for line in self.lines.push(chunk) {
            self.line(&line, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Decoded {
        let mut out = Decoded::default();
        if let Some(rest) = self.lines.take_rest() {
            self.line(&rest, &mut out);
        }
        out.done = true;
        out
    }
}

/// Newline-delimited JSON decoder. No sentinel: the stream ends with the transport.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    lines: LineBuffer,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(line: &str, out: &mut Decoded) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(obj) => {
                if let Extracted::Text(text) = non_empty(obj.pointer("/message/content")) {
                    out.deltas.push(text);
                }
            }
            Err(e) => trace!(error = %e, "Skipping malformed line"),
        }
    }
}

impl FrameDecoder for NdjsonDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Decoded {
        let mut out = Decoded::default();
        for line in self.lines.push(chunk) {
            Self::line(&line, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Decoded {
        let mut out = Decoded::default();
        if let Some(rest) = self.lines.take_rest() {
            Self::line(&rest, &mut out);
        }
        out.done = true;
        out
    }
}

//! Server-sent-events framing for the push channel.
//!
//! DESIGN
//! ======
//! The decoder is fed raw body chunks as they arrive and yields complete
//! frames. Lines are split on `\n` with a trailing `\r` stripped, so both
//! LF and CRLF servers work. A frame is dispatched on the blank line that
//! terminates it; a partial frame left over when the stream ends is dropped,
//! which matches what browsers do with `EventSource`.
//!
//! `retry:` hints are parsed away and ignored. The reconnect delay is owned
//! by the transport and stays fixed.

use bytes::BytesMut;

/// Name browsers use for unnamed frames.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// One complete server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if the server named the frame.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// Value of the last `id:` field seen in this frame.
    pub id: Option<String>,
}

impl SseFrame {
    /// True for frames an `onmessage` listener would see.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.event.as_deref().is_none_or(|name| name == DEFAULT_EVENT_NAME)
    }
}

/// Incremental line-oriented SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    data_lines: Vec<String>,
    event: Option<String>,
    id: Option<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes = self.buffer.split_to(newline_pos + 1);
            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }

            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Signal end of stream. Any unterminated frame is discarded.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() || !self.data_lines.is_empty() {
            tracing::debug!(
                pending_bytes = self.buffer.len(),
                pending_lines = self.data_lines.len(),
                "sse: dropping unterminated frame at end of stream"
            );
        }
        self.buffer.clear();
        self.reset_frame();
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data_lines.push(value.to_owned()),
            "event" => self.event = Some(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            "retry" => {}
            other => tracing::trace!(field = other, "sse: ignoring unknown field"),
        }
        None
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.data_lines.is_empty() {
            self.reset_frame();
            return None;
        }
        let frame = SseFrame {
            event: self.event.take().filter(|name| !name.is_empty()),
            data: self.data_lines.join("\n"),
            id: self.id.take(),
        };
        self.data_lines.clear();
        Some(frame)
    }

    fn reset_frame(&mut self) {
        self.data_lines.clear();
        self.event = None;
        self.id = None;
    }
}

#[cfg(test)]
#[path = "sse_test.rs"]
mod tests;

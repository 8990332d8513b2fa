//! Decoder for the `/chat` response body.
//!
//! The body is a sequence of blocks separated by a blank line (`\n\n`, or
//! `\n\r\n` when lines end in CRLF). Each
//! block holds one or more `data:` lines. A data line is either the `[DONE]`
//! sentinel, a JSON object carrying text in `chunk` or `partial`, a JSON object
//! carrying `error`, or anything else, which is passed through as raw text.
//!
//! Bytes are buffered until a whole block is available, so the frames produced
//! do not depend on how the network split the body.

use palms_types::DONE_SENTINEL;
use serde_json::Value;

const DATA_MARKER: &str = "data:";

/// One decoded unit of the chat stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Text to append to the reply
    Delta(String),
    /// The `[DONE]` sentinel
    Done,
    /// Server-signalled failure
    Error(String),
}

/// Incremental decoder; feed it every read with [`push`](Self::push) and call
/// [`finish`](Self::finish) once the connection ends.
///
/// After a `Done` or `Error` frame the decoder is terminated and ignores any
/// further input.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    // bytes of `buffer` already searched for a separator
    scanned: usize,
    terminated: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Unterminated bytes carried over to the next read
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append a read and decode every block it completes
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if self.terminated {
            return frames;
        }

        self.buffer.extend_from_slice(bytes);

        while let Some((end, separator_len)) = self.next_block_end() {
            let block: Vec<u8> = self.buffer.drain(..end + separator_len).collect();
            self.scanned = 0;
            self.decode_block(&block[..end], &mut frames);
            if self.terminated {
                self.buffer.clear();
                break;
            }
        }

        frames
    }

    /// Decode whatever is left once the connection has closed
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if self.terminated {
            return frames;
        }

        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if !rest.is_empty() {
            self.decode_block(&rest, &mut frames);
        }
        self.terminated = true;
        frames
    }

    /// Offset of the line break ending the next block, and the length of the
    /// separator starting there (`\n\n` or `\n\r\n`)
    fn next_block_end(&mut self) -> Option<(usize, usize)> {
        // A separator may straddle the previous scan boundary
        let start = self.scanned.saturating_sub(2);
        let buffer = &self.buffer;
        let found = (start..buffer.len()).find_map(|i| {
            if buffer[i] != b'\n' {
                return None;
            }
            match (buffer.get(i + 1), buffer.get(i + 2)) {
                (Some(b'\n'), _) => Some((i, 2)),
                (Some(b'\r'), Some(b'\n')) => Some((i, 3)),
                _ => None,
            }
        });
        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }

    fn decode_block(&mut self, block: &[u8], frames: &mut Vec<SseFrame>) {
        // Blocks never split a UTF-8 sequence, so lossy decoding only
        // replaces bytes that were invalid on the wire.
        let text = String::from_utf8_lossy(block);

        for raw_line in text.split('\n') {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            let Some(data) = strip_data_marker(line) else {
                continue;
            };
            if data.is_empty() {
                continue;
            }

            match interpret_data(data) {
                Interpreted::Done => {
                    frames.push(SseFrame::Done);
                    self.terminated = true;
                    return;
                }
                Interpreted::Error(message) => {
                    frames.push(SseFrame::Error(message));
                    self.terminated = true;
                    return;
                }
                Interpreted::Text(parts) => {
                    frames.extend(parts.into_iter().map(SseFrame::Delta));
                }
            }
        }
    }
}

enum Interpreted {
    Done,
    Error(String),
    Text(Vec<String>),
}

fn strip_data_marker(line: &str) -> Option<&str> {
    let data = line.strip_prefix(DATA_MARKER)?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

fn interpret_data(data: &str) -> Interpreted {
    if data.trim() == DONE_SENTINEL {
        return Interpreted::Done;
    }

    let object = match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(object)) => object,
        // Not a JSON object: forward the line as literal text
        _ => return Interpreted::Text(vec![data.to_string()]),
    };

    if let Some(error) = object.get("error").filter(|value| !value.is_null()) {
        return Interpreted::Error(error_message(error));
    }

    // Both field names are accepted; if both are present they are applied in
    // the order they appear in the object.
    let parts = object
        .iter()
        .filter(|(key, _)| matches!(key.as_str(), "chunk" | "partial"))
        .filter_map(|(_, value)| value.as_str())
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();

    Interpreted::Text(parts)
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(object) => object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

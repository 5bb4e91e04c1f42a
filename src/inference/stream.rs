//! Line buffer for newline-delimited JSON generate streams
//!
//! Network chunks split lines arbitrarily; this buffer holds the partial tail
//! until its newline arrives.

use crate::errors::{Result, RouterError};
use crate::inference::types::GenerateChunk;
use bytes::BytesMut;
use tracing::debug;

/// Maximum bytes held for a single unterminated line (1MB)
pub const MAX_LINE_BYTES: usize = 1_048_576;

#[derive(Debug)]
pub struct NdjsonBuffer {
    buffer: BytesMut,
    max_line_bytes: usize,
}

impl Default for NdjsonBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl NdjsonBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }

    pub fn with_limit(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_line_bytes,
        }
    }

    /// Append bytes and return every complete chunk now available
    ///
    /// Lines that are not valid chunk JSON are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<GenerateChunk>> {
        self.buffer.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            if let Some(chunk) = parse_line(&line[..pos]) {
                chunks.push(chunk);
            }
        }

        if self.buffer.len() > self.max_line_bytes {
            let len = self.buffer.len();
            self.buffer.clear();
            return Err(RouterError::LocalInferenceFailure(format!(
                "Stream line of {} bytes exceeds maximum {}",
                len, self.max_line_bytes
            )));
        }

        Ok(chunks)
    }

    /// Parse whatever remains once the stream has ended
    pub fn finish(&mut self) -> Option<GenerateChunk> {
        let rest = self.buffer.split();
        parse_line(&rest)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn parse_line(line: &[u8]) -> Option<GenerateChunk> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_slice(trimmed) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            debug!(error = %e, "Skipping malformed stream line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut buffer = NdjsonBuffer::new();
        let chunks = buffer
            .push(b"{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":false}\n")
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].response, "Hel");
        assert_eq!(chunks[1].response, "lo");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_line_split_across_pushes() {
        let mut buffer = NdjsonBuffer::new();
        assert!(buffer.push(b"{\"response\":\"wor").unwrap().is_empty());
        assert!(!buffer.is_empty());

        let chunks = buffer.push(b"ld\",\"done\":true}\n").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].response, "world");
        assert!(chunks[0].done);
    }

    #[test]
    fn test_malformed_and_blank_lines_skipped() {
        let mut buffer = NdjsonBuffer::new();
        let chunks = buffer
            .push(b"not json\n\n{\"response\":\"ok\",\"done\":true}\n")
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].response, "ok");
    }

    #[test]
    fn test_finish_parses_unterminated_tail() {
        let mut buffer = NdjsonBuffer::new();
        assert!(buffer.push(b"{\"response\":\"tail\",\"done\":true}").unwrap().is_empty());
        let last = buffer.finish().unwrap();
        assert_eq!(last.response, "tail");
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn test_oversized_line_rejected() {
        let mut buffer = NdjsonBuffer::with_limit(16);
        let err = buffer.push(&[b'x'; 32]).unwrap_err();
        assert!(err.is_inference_error());
        assert!(buffer.is_empty());
    }
}

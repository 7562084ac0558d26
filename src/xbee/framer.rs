//! Newline framer for the XBee serial link.
//!
//! The radio emits one ASCII line per message, terminated by `\n` (usually `\r\n`).
//! This module provides a small incremental framer that can be fed arbitrary chunks and
//! yields whole lines when available. A pending line that grows past [`MAX_LINE_LEN`]
//! is dropped and framing resynchronizes at the next `\n`.
use bytes::{Buf, BytesMut};
use log::warn;

/// Maximum accepted line length (sane upper bound to avoid runaway allocation)
pub const MAX_LINE_LEN: usize = 1024;

pub struct LineFramer {
    buf: BytesMut,
    // Set while skipping the remainder of an oversize line
    discarding: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            discarding: false,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered for the line currently being received.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete line (terminator excluded), or `None` if no full line
    /// is buffered yet.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            match self.buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let line = self.buf.split_to(pos);
                    self.buf.advance(1);
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if pos > MAX_LINE_LEN {
                        warn!("Dropping oversize serial line ({} bytes)", pos);
                        continue;
                    }
                    return Some(String::from_utf8_lossy(&line).into_owned());
                }
                None => {
                    if self.buf.len() > MAX_LINE_LEN {
                        warn!(
                            "Dropping oversize serial line ({} bytes without newline)",
                            self.buf.len()
                        );
                        self.buf.clear();
                        self.discarding = true;
                    }
                    return None;
                }
            }
        }
    }

    /// Push a chunk and collect every line it completes.
    pub fn push_lines(&mut self, data: &[u8]) -> Vec<String> {
        self.push(data);
        let mut lines = Vec::new();
        while let Some(line) = self.next_line() {
            lines.push(line);
        }
        lines
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

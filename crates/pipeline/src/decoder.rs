//! Incremental JSON decoder
//!
//! Bytes are appended to the session buffer and a [`Scanner`] walks them
//! once, tracking bracket nesting and string state across reads. Only when it
//! reaches the end of a top-level value is that region handed to
//! `serde_json`, so each byte is scanned once and parsed once however the
//! stream is chunked. Feeding a stream in any chunking yields the same values
//! as feeding it whole.
//!
//! Incomplete input (unterminated string, unmatched brace) waits for more
//! bytes. A value that fails to parse drops the whole pending region once.
//! A bare scalar (number, `true`, ..) ending exactly at the end of the buffer
//! is held back until a delimiter arrives or the stream ends.

use std::ops::Range;

use serde_json::Value;

use crate::buffer::DecodeBuffer;
use crate::error::BufferError;
use crate::session::Session;

/// Result of one feed or flush
#[derive(Debug, Default)]
pub struct Decoded {
    /// Complete values in input order
    pub values: Vec<Value>,
    /// Pending region dropped as malformed, if any
    pub malformed: Option<Malformed>,
}

/// A discarded malformed region
#[derive(Debug)]
pub struct Malformed {
    /// Bytes dropped
    pub bytes: usize,
    /// Parser error text
    pub error: String,
}

/// Append `bytes` to the session and decode every complete value
///
/// A faulted session ignores input and yields nothing.
///
/// # Errors
///
/// Returns the growth error when the buffer cannot hold the input. The
/// session is faulted and its buffer freed before returning.
pub fn feed(session: &mut Session, bytes: &[u8]) -> Result<Decoded, BufferError> {
    if session.is_faulted() {
        return Ok(Decoded::default());
    }

    if let Err(e) = session.buffer_mut().append(bytes) {
        session.fault();
        return Err(e);
    }

    let (buffer, scanner) = session.decode_parts();
    Ok(scan(buffer, scanner, false))
}

/// Finish a session whose stream has ended
///
/// Emits a trailing bare scalar that was held back, then discards whatever
/// incomplete bytes remain. Returns the values and the count of discarded
/// non-whitespace bytes.
pub fn flush(session: &mut Session) -> (Decoded, usize) {
    if session.is_faulted() {
        return (Decoded::default(), 0);
    }

    let (buffer, scanner) = session.decode_parts();
    let decoded = scan(buffer, scanner, true);
    let leftover = buffer
        .pending()
        .iter()
        .filter(|b| !b.is_ascii_whitespace())
        .count();
    buffer.release();
    scanner.reset();
    (decoded, leftover)
}

fn scan(buffer: &mut DecodeBuffer, scanner: &mut Scanner, at_end: bool) -> Decoded {
    let mut decoded = Decoded::default();
    let pending = buffer.pending();

    while let Some(region) = scanner.next_value(pending, at_end) {
        match serde_json::from_slice::<Value>(&pending[region.clone()]) {
            Ok(value) => decoded.values.push(value),
            // a scalar cut off by the end of the stream
            Err(e) if e.is_eof() && at_end && region.end == pending.len() => {
                scanner.unread(region.start);
                break;
            }
            Err(e) => {
                decoded.malformed = Some(Malformed {
                    bytes: pending.len() - region.start,
                    error: e.to_string(),
                });
                let len = pending.len();
                scanner.reset();
                buffer.advance(len);
                buffer.compact();
                return decoded;
            }
        }
    }

    let consumed = scanner.consumed();
    scanner.rebase(consumed);
    buffer.advance(consumed);
    buffer.compact();
    decoded
}

/// Kind of the top-level value being scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Container,
    Text,
    Scalar,
}

/// Resumable boundary scan over a session's pending bytes
///
/// Offsets are relative to the start of the pending region and are rebased
/// whenever the buffer consumes bytes.
#[derive(Debug, Default)]
pub(crate) struct Scanner {
    /// Next byte to look at
    pos: usize,
    /// Start of the value in progress
    start: usize,
    kind: Option<Kind>,
    /// Closing brackets expected, innermost last
    closers: Vec<u8>,
    in_string: bool,
    escaped: bool,
}

impl Scanner {
    /// Forget all progress
    pub(crate) fn reset(&mut self) {
        self.pos = 0;
        self.start = 0;
        self.end_value();
    }

    /// Scan forward to the end of the next top-level value
    fn next_value(&mut self, pending: &[u8], at_end: bool) -> Option<Range<usize>> {
        while self.pos < pending.len() {
            let b = pending[self.pos];
            self.pos += 1;

            let Some(kind) = self.kind else {
                if b.is_ascii_whitespace() {
                    continue;
                }
                self.start = self.pos - 1;
                match b {
                    b'{' => self.open(Kind::Container, b'}'),
                    b'[' => self.open(Kind::Container, b']'),
                    b'"' => {
                        self.kind = Some(Kind::Text);
                        self.in_string = true;
                    }
                    b'-' | b'0'..=b'9' | b't' | b'f' | b'n' => self.kind = Some(Kind::Scalar),
                    // cannot start a value; let the parser report it
                    _ => return Some(self.take()),
                }
                continue;
            };

            if kind == Kind::Scalar {
                if is_delimiter(b) {
                    self.pos -= 1;
                    return Some(self.take());
                }
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if kind == Kind::Text {
                        return Some(self.take());
                    }
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' => self.closers.push(b'}'),
                b'[' => self.closers.push(b']'),
                b'}' | b']' => {
                    // a mismatched closer ends the value early and fails to parse
                    if self.closers.pop() != Some(b) || self.closers.is_empty() {
                        return Some(self.take());
                    }
                }
                _ => {}
            }
        }

        if at_end && self.kind == Some(Kind::Scalar) {
            return Some(self.take());
        }
        None
    }

    fn open(&mut self, kind: Kind, closer: u8) {
        self.kind = Some(kind);
        self.closers.push(closer);
    }

    fn take(&mut self) -> Range<usize> {
        let region = self.start..self.pos;
        self.end_value();
        region
    }

    fn end_value(&mut self) {
        self.kind = None;
        self.closers.clear();
        self.in_string = false;
        self.escaped = false;
    }

    /// Rewind to `start` so the bytes from there stay pending
    fn unread(&mut self, start: usize) {
        self.end_value();
        self.kind = Some(Kind::Scalar);
        self.start = start;
    }

    /// Bytes before the value in progress, or everything scanned when idle
    fn consumed(&self) -> usize {
        if self.kind.is_some() { self.start } else { self.pos }
    }

    fn rebase(&mut self, consumed: usize) {
        self.pos -= consumed;
        self.start = self.start.saturating_sub(consumed);
    }
}

/// Bytes that end a bare scalar
#[inline]
fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'{' | b'}' | b'[' | b']' | b'"' | b',' | b':')
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;

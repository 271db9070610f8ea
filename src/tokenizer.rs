//! Byte buffer with a read cursor, the primitive under the request parser

use netbuf::Buf;

use crate::error::Error;

/// Result of scanning for a delimiter
#[derive(Debug)]
pub enum Scan<'a> {
    /// The bytes up to (excluding) the delimiter; the cursor has moved
    /// past the delimiter.
    Complete(&'a [u8]),
    /// Delimiter not found yet, more bytes are needed
    Partial,
    /// Delimiter not found and the buffer cannot grow any further
    Overflow,
}

/// Append-only byte region with a read cursor
///
/// The buffer is bounded: `append` past the limit fails, which is what
/// enforces the request size cap. Slices handed out by `consume` and
/// `consume_until` point into the internal buffer and are invalidated by
/// `compact`, so callers copy out anything they keep.
pub struct ByteTokenizer {
    buf: Buf,
    pos: usize,
    limit: usize,
}

impl ByteTokenizer {
    /// New tokenizer holding at most `limit` bytes
    pub fn new(limit: usize) -> ByteTokenizer {
        ByteTokenizer {
            buf: Buf::new(),
            pos: 0,
            limit,
        }
    }

    /// Append bytes, failing when the buffer would exceed its limit
    ///
    /// The limit covers consumed-but-not-compacted bytes too: everything
    /// between two `compact` calls belongs to the request currently being
    /// parsed.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.buf.len() + bytes.len() > self.limit {
            return Err(Error::RequestTooLong);
        }
        self.buf.extend(bytes);
        Ok(())
    }

    /// Number of unconsumed bytes
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True if no unconsumed bytes are left
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// True when the buffer is full and only `compact` can make room
    pub fn at_capacity(&self) -> bool {
        self.buf.len() >= self.limit
    }

    /// Unconsumed byte at offset `i` from the cursor
    pub fn peek(&self, i: usize) -> Option<u8> {
        self.window().get(i).copied()
    }

    /// View of all unconsumed bytes
    pub fn window(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Scan for `delim` and consume through it
    ///
    /// Reports `Overflow` when the delimiter is absent and the buffer is at
    /// its limit, since no future append can complete the scan.
    pub fn consume_until(&mut self, delim: &[u8]) -> Scan<'_> {
        let found = self
            .window()
            .windows(delim.len())
            .position(|w| w == delim);
        match found {
            Some(i) => {
                let start = self.pos;
                self.pos += i + delim.len();
                Scan::Complete(&self.buf[start..start + i])
            }
            None if self.at_capacity() => Scan::Overflow,
            None => Scan::Partial,
        }
    }

    /// Consume exactly `n` bytes, or `None` if fewer are buffered
    pub fn consume(&mut self, n: usize) -> Option<&[u8]> {
        if self.remaining() < n {
            return None;
        }
        let start = self.pos;
        self.pos += n;
        Some(&self.buf[start..start + n])
    }

    /// Drop the consumed prefix, freeing budget for the next request
    ///
    /// Invalidates any slice previously returned.
    pub fn compact(&mut self) {
        self.buf.consume(self.pos);
        self.pos = 0;
    }
}

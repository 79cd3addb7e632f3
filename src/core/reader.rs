//! Character Reader
//!
//! Cursor over the document bytes that yields decoded code points through
//! the active `ByteDecoder`. Offsets are always byte offsets; conversion to
//! the character units stored in tokens happens in the lexer.
//!
//! Line/column computation for error reporting lives here as well: it is
//! only run on the failure path and counts newlines with memchr.

use memchr::memchr_iter;

use crate::core::chars::is_space_char;
use crate::core::decoder::ByteDecoder;
use crate::core::encoding::Encoding;
use crate::error::{ParseError, Position, Result};

pub struct CharReader<'a> {
    doc: &'a [u8],
    /// First byte of the document range
    start: usize,
    /// One past the last byte of the document range
    end: usize,
    offset: usize,
    /// Offset of the character returned by the last `get_char`
    prev: usize,
    encoding: Encoding,
    decoder: Box<dyn ByteDecoder>,
}

impl<'a> CharReader<'a> {
    pub fn new(doc: &'a [u8], start: usize, end: usize, encoding: Encoding) -> Self {
        CharReader {
            doc,
            start,
            end,
            offset: start,
            prev: start,
            encoding,
            decoder: encoding.decoder(),
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Start offset of the most recently read character
    #[inline]
    pub fn prev(&self) -> usize {
        self.prev
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn doc(&self) -> &'a [u8] {
        self.doc
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Install the decoder for a newly declared encoding
    pub fn switch_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
        self.decoder = encoding.decoder();
    }

    #[inline]
    fn window(&self) -> &'a [u8] {
        &self.doc[..self.end]
    }

    /// Read the next character, failing with `Eof` at the end of the range
    #[inline]
    pub fn get_char(&mut self) -> Result<u32> {
        if self.offset >= self.end {
            return Err(ParseError::Eof);
        }
        let (c, width) = self.decoder.decode(self.window(), self.offset)?;
        self.prev = self.offset;
        self.offset += width;
        Ok(c)
    }

    /// Consume the next character if it equals `expected`
    #[inline]
    pub fn skip_char(&mut self, expected: u32) -> Result<bool> {
        if self.offset >= self.end {
            return Err(ParseError::Eof);
        }
        let (c, width) = self.decoder.decode(self.window(), self.offset)?;
        if c == expected {
            self.prev = self.offset;
            self.offset += width;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume `expected` in full or fail with nothing but the matched
    /// prefix consumed.
    pub fn skip_str(&mut self, expected: &str) -> Result<bool> {
        for c in expected.chars() {
            if !self.skip_char(c as u32)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Consume an ASCII letter in either case
    pub fn skip_either(&mut self, lower: u8, upper: u8) -> Result<bool> {
        Ok(self.skip_char(lower as u32)? || self.skip_char(upper as u32)?)
    }

    /// Skip whitespace and return the first non-whitespace character
    #[inline]
    pub fn get_char_after_space(&mut self) -> Result<u32> {
        loop {
            let c = self.get_char()?;
            if !is_space_char(c) {
                return Ok(c);
            }
        }
    }

    /// Decode the character at an arbitrary offset without moving
    #[inline]
    pub fn char_at(&self, offset: usize) -> Result<(u32, usize)> {
        if offset >= self.end {
            return Err(ParseError::Eof);
        }
        self.decoder.decode(self.window(), offset)
    }

    /// Whether the characters of a range spell `expected`
    pub fn range_eq_str(&self, offset: usize, len: usize, expected: &str) -> Result<bool> {
        let end = offset + len;
        let mut pos = offset;
        for want in expected.chars() {
            if pos >= end {
                return Ok(false);
            }
            let (c, width) = self.char_at(pos)?;
            if c != want as u32 {
                return Ok(false);
            }
            pos += width;
        }
        Ok(pos == end)
    }

    /// Bytes of a range inside the document
    #[inline]
    pub fn bytes(&self, offset: usize, len: usize) -> &'a [u8] {
        &self.doc[offset..offset + len]
    }

    /// Line and column of a byte offset, both 1-based
    pub fn position_of(&self, offset: usize) -> Position {
        position_of(self.doc, self.start, offset.min(self.end), self.encoding)
    }
}

/// Count lines and columns from `start` to `offset`.
pub fn position_of(doc: &[u8], start: usize, offset: usize, encoding: Encoding) -> Position {
    let offset = offset.max(start);
    let span = &doc[start..offset];
    match encoding {
        Encoding::Utf16Le | Encoding::Utf16Be => {
            let nl: [u8; 2] = if encoding == Encoding::Utf16Le {
                [b'\n', 0]
            } else {
                [0, b'\n']
            };
            let mut line = 1u32;
            let mut line_start = 0usize;
            for (i, unit) in span.chunks_exact(2).enumerate() {
                if unit == nl {
                    line += 1;
                    line_start = (i + 1) * 2;
                }
            }
            let column = (span.len() - line_start) / 2 + 1;
            Position {
                line,
                column: column as u32,
            }
        }
        _ => {
            let mut line = 1u32;
            let mut line_start = 0usize;
            for i in memchr_iter(b'\n', span) {
                line += 1;
                line_start = i + 1;
            }
            let tail = &span[line_start..];
            let column = if encoding == Encoding::Utf8 {
                tail.iter().filter(|&&b| b & 0xC0 != 0x80).count()
            } else {
                tail.len()
            };
            Position {
                line,
                column: column as u32 + 1,
            }
        }
    }
}

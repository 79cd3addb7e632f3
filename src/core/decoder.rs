//! Byte Decoders
//!
//! One `ByteDecoder` per supported encoding turns the bytes at an offset
//! into a code point and its width. The lexer swaps decoders when an XML
//! declaration names a different (compatible) encoding.
//!
//! Single-byte code pages other than ASCII and Latin-1 are built from the
//! `encoding_rs` tables.

use crate::core::encoding::Encoding;
use crate::error::{ParseError, Result};

/// Decodes one character at a time from a byte slice.
///
/// `bytes` ends at the document end; a sequence running past it is a
/// premature end of document.
pub trait ByteDecoder: Send + Sync {
    /// Decode the character starting at `offset`, returning the code point
    /// and the number of bytes it occupies.
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(u32, usize)>;
}

/// Strict UTF-8: rejects overlong forms, surrogates and values past U+10FFFF
pub struct Utf8Decoder;

impl ByteDecoder for Utf8Decoder {
    #[inline]
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
        let b0 = bytes[offset];
        if b0 < 0x80 {
            return Ok((b0 as u32, 1));
        }
        let (width, init, min) = match b0 {
            0xC2..=0xDF => (2, (b0 & 0x1F) as u32, 0x80),
            0xE0..=0xEF => (3, (b0 & 0x0F) as u32, 0x800),
            0xF0..=0xF4 => (4, (b0 & 0x07) as u32, 0x10000),
            _ => return Err(invalid_utf8(b0)),
        };
        if offset + width > bytes.len() {
            return Err(ParseError::Eof);
        }
        let mut cp = init;
        for &b in &bytes[offset + 1..offset + width] {
            if b & 0xC0 != 0x80 {
                return Err(invalid_utf8(b));
            }
            cp = (cp << 6) | (b & 0x3F) as u32;
        }
        if cp < min || cp > 0x10FFFF || (0xD800..=0xDFFF).contains(&cp) {
            return Err(ParseError::encoding(format!(
                "invalid UTF-8 sequence decoding to U+{:04X}",
                cp
            )));
        }
        Ok((cp, width))
    }
}

fn invalid_utf8(b: u8) -> ParseError {
    ParseError::encoding(format!("invalid UTF-8 byte 0x{:02X}", b))
}

/// 7-bit ASCII
pub struct AsciiDecoder;

impl ByteDecoder for AsciiDecoder {
    #[inline]
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
        let b = bytes[offset];
        if b >= 0x80 {
            return Err(ParseError::encoding(format!("invalid ASCII byte 0x{:02X}", b)));
        }
        Ok((b as u32, 1))
    }
}

/// ISO-8859-1: every byte is its own code point
pub struct Latin1Decoder;

impl ByteDecoder for Latin1Decoder {
    #[inline]
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
        Ok((bytes[offset] as u32, 1))
    }
}

const UNMAPPED: u32 = u32::MAX;

/// Table-driven single-byte code page
pub struct SingleByteDecoder {
    table: Box<[u32; 256]>,
    name: &'static str,
}

impl SingleByteDecoder {
    /// Build the byte-to-code-point table of an `encoding_rs` single-byte
    /// encoding.
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        let mut table = Box::new([UNMAPPED; 256]);
        for (b, slot) in table.iter_mut().enumerate() {
            let byte = [b as u8];
            if let Some(s) = encoding.decode_without_bom_handling_and_without_replacement(&byte) {
                if let Some(c) = s.chars().next() {
                    *slot = c as u32;
                }
            }
        }
        SingleByteDecoder {
            table,
            name: encoding.name(),
        }
    }
}

impl ByteDecoder for SingleByteDecoder {
    #[inline]
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
        let b = bytes[offset];
        match self.table[b as usize] {
            UNMAPPED => Err(ParseError::encoding(format!(
                "byte 0x{:02X} is not mapped in {}",
                b, self.name
            ))),
            cp => Ok((cp, 1)),
        }
    }
}

/// UTF-16 with surrogate pair validation
pub struct Utf16Decoder {
    big_endian: bool,
}

impl Utf16Decoder {
    pub fn big_endian() -> Self {
        Utf16Decoder { big_endian: true }
    }

    pub fn little_endian() -> Self {
        Utf16Decoder { big_endian: false }
    }

    #[inline]
    fn unit(&self, bytes: &[u8], offset: usize) -> Result<u32> {
        if offset + 2 > bytes.len() {
            return Err(ParseError::Eof);
        }
        let pair = [bytes[offset], bytes[offset + 1]];
        let unit = if self.big_endian {
            u16::from_be_bytes(pair)
        } else {
            u16::from_le_bytes(pair)
        };
        Ok(unit as u32)
    }
}

impl ByteDecoder for Utf16Decoder {
    #[inline]
    fn decode(&self, bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
        let hi = self.unit(bytes, offset)?;
        match hi {
            0xD800..=0xDBFF => {
                let lo = self.unit(bytes, offset + 2)?;
                if !(0xDC00..=0xDFFF).contains(&lo) {
                    return Err(ParseError::encoding("UTF-16 high surrogate without low surrogate"));
                }
                Ok((0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00), 4))
            }
            0xDC00..=0xDFFF => Err(ParseError::encoding("unpaired UTF-16 low surrogate")),
            _ => Ok((hi, 2)),
        }
    }
}

/// Decoder for an encoding
pub fn for_encoding(encoding: Encoding) -> Box<dyn ByteDecoder> {
    use encoding_rs as rs;
    let table: &'static rs::Encoding = match encoding {
        Encoding::Ascii => return Box::new(AsciiDecoder),
        Encoding::Utf8 => return Box::new(Utf8Decoder),
        Encoding::Iso8859_1 => return Box::new(Latin1Decoder),
        Encoding::Utf16Be => return Box::new(Utf16Decoder::big_endian()),
        Encoding::Utf16Le => return Box::new(Utf16Decoder::little_endian()),
        Encoding::Iso8859_2 => rs::ISO_8859_2,
        Encoding::Iso8859_3 => rs::ISO_8859_3,
        Encoding::Iso8859_4 => rs::ISO_8859_4,
        Encoding::Iso8859_5 => rs::ISO_8859_5,
        Encoding::Iso8859_6 => rs::ISO_8859_6,
        Encoding::Iso8859_7 => rs::ISO_8859_7,
        Encoding::Iso8859_8 => rs::ISO_8859_8,
        // WHATWG folds Latin-5 into windows-1254 and Thai into windows-874
        Encoding::Iso8859_9 => rs::WINDOWS_1254,
        Encoding::Iso8859_10 => rs::ISO_8859_10,
        Encoding::Iso8859_11 => rs::WINDOWS_874,
        Encoding::Iso8859_13 => rs::ISO_8859_13,
        Encoding::Iso8859_14 => rs::ISO_8859_14,
        Encoding::Iso8859_15 => rs::ISO_8859_15,
        Encoding::Iso8859_16 => rs::ISO_8859_16,
        Encoding::Windows1250 => rs::WINDOWS_1250,
        Encoding::Windows1251 => rs::WINDOWS_1251,
        Encoding::Windows1252 => rs::WINDOWS_1252,
        Encoding::Windows1253 => rs::WINDOWS_1253,
        Encoding::Windows1254 => rs::WINDOWS_1254,
        Encoding::Windows1255 => rs::WINDOWS_1255,
        Encoding::Windows1256 => rs::WINDOWS_1256,
        Encoding::Windows1257 => rs::WINDOWS_1257,
        Encoding::Windows1258 => rs::WINDOWS_1258,
    };
    Box::new(SingleByteDecoder::new(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &dyn ByteDecoder, bytes: &[u8]) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (cp, width) = decoder.decode(bytes, offset)?;
            out.push(cp);
            offset += width;
        }
        Ok(out)
    }

    #[test]
    fn test_utf8_multibyte() {
        let text = "aé中😀";
        let cps = decode_all(&Utf8Decoder, text.as_bytes()).unwrap();
        let expected: Vec<u32> = text.chars().map(|c| c as u32).collect();
        assert_eq!(cps, expected);
    }

    #[test]
    fn test_utf8_rejects_overlong_and_surrogates() {
        assert!(Utf8Decoder.decode(&[0xC0, 0xAF], 0).is_err());
        assert!(Utf8Decoder.decode(&[0xE0, 0x80, 0xAF], 0).is_err());
        assert!(Utf8Decoder.decode(&[0xED, 0xA0, 0x80], 0).is_err());
        assert!(Utf8Decoder.decode(&[0xF4, 0x90, 0x80, 0x80], 0).is_err());
        assert!(Utf8Decoder.decode(&[0x80], 0).is_err());
    }

    #[test]
    fn test_utf8_truncated_is_eof() {
        assert_eq!(Utf8Decoder.decode(&[0xE4, 0xB8], 0), Err(ParseError::Eof));
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        assert_eq!(AsciiDecoder.decode(b"a", 0).unwrap(), ('a' as u32, 1));
        assert!(matches!(AsciiDecoder.decode(&[0xE9], 0), Err(ParseError::Encoding { .. })));
    }

    #[test]
    fn test_latin1_identity() {
        assert_eq!(Latin1Decoder.decode(&[0xE9], 0).unwrap(), (0xE9, 1));
    }

    #[test]
    fn test_code_page_tables() {
        let win1252 = for_encoding(Encoding::Windows1252);
        assert_eq!(win1252.decode(&[0x80], 0).unwrap(), (0x20AC, 1));
        let cyrillic = for_encoding(Encoding::Iso8859_5);
        assert_eq!(cyrillic.decode(&[0xB0], 0).unwrap(), (0x0410, 1));
        let latin9 = for_encoding(Encoding::Iso8859_15);
        assert_eq!(latin9.decode(&[0xA4], 0).unwrap(), (0x20AC, 1));
        assert_eq!(latin9.decode(b"<", 0).unwrap(), ('<' as u32, 1));
    }

    #[test]
    fn test_utf16_surrogates() {
        let le = Utf16Decoder::little_endian();
        // U+1F600 as D83D DE00
        let bytes = [0x3D, 0xD8, 0x00, 0xDE];
        assert_eq!(le.decode(&bytes, 0).unwrap(), (0x1F600, 4));
        assert!(le.decode(&[0x00, 0xDC], 0).is_err());
        assert!(le.decode(&[0x3D, 0xD8, b'a', 0x00], 0).is_err());
        assert_eq!(le.decode(&[0x3D, 0xD8], 0), Err(ParseError::Eof));
    }

    #[test]
    fn test_utf16_byte_order() {
        let be = Utf16Decoder::big_endian();
        assert_eq!(be.decode(&[0x00, b'<'], 0).unwrap(), ('<' as u32, 2));
        let le = Utf16Decoder::little_endian();
        assert_eq!(le.decode(&[b'<', 0x00], 0).unwrap(), ('<' as u32, 2));
    }
}

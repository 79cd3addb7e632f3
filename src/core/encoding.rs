//! XML Encoding Detection
//!
//! Sniffs the byte order of a document from its first bytes and names the
//! encodings a declaration may switch to:
//! - BOMs: UTF-8 (`EF BB BF`), UTF-16BE (`FE FF`), UTF-16LE (`FF FE`)
//! - Unmarked UTF-16 recognized from `<?` in 16-bit code units
//! - Everything else starts out as UTF-8
//!
//! The numeric codes are the ones written into persisted indexes.

use crate::core::decoder::{self, ByteDecoder};
use crate::error::{ParseError, Result};

/// Largest document end offset for single-byte encodings in namespace mode
pub const MAX_NS_DOC_SIZE: usize = 1 << 30;
/// Largest document end offset otherwise
pub const MAX_DOC_SIZE: usize = 1 << 31;

/// Character encodings a document can be indexed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Ascii,
    Iso8859_1,
    Utf8,
    Iso8859_2,
    Iso8859_3,
    Iso8859_4,
    Iso8859_5,
    Iso8859_6,
    Iso8859_7,
    Iso8859_8,
    Iso8859_9,
    Iso8859_10,
    Iso8859_11,
    Iso8859_13,
    Iso8859_14,
    Iso8859_15,
    Iso8859_16,
    Windows1250,
    Windows1251,
    Windows1252,
    Windows1253,
    Windows1254,
    Windows1255,
    Windows1256,
    Windows1257,
    Windows1258,
    Utf16Be,
    Utf16Le,
}

const ISO_8859: [Encoding; 15] = [
    Encoding::Iso8859_1,
    Encoding::Iso8859_2,
    Encoding::Iso8859_3,
    Encoding::Iso8859_4,
    Encoding::Iso8859_5,
    Encoding::Iso8859_6,
    Encoding::Iso8859_7,
    Encoding::Iso8859_8,
    Encoding::Iso8859_9,
    Encoding::Iso8859_10,
    Encoding::Iso8859_11,
    Encoding::Iso8859_13,
    Encoding::Iso8859_14,
    Encoding::Iso8859_15,
    Encoding::Iso8859_16,
];

const WINDOWS: [Encoding; 9] = [
    Encoding::Windows1250,
    Encoding::Windows1251,
    Encoding::Windows1252,
    Encoding::Windows1253,
    Encoding::Windows1254,
    Encoding::Windows1255,
    Encoding::Windows1256,
    Encoding::Windows1257,
    Encoding::Windows1258,
];

impl Encoding {
    /// Code stored in the index header
    pub fn code(self) -> u8 {
        match self {
            Encoding::Ascii => 0,
            Encoding::Iso8859_1 => 1,
            Encoding::Utf8 => 2,
            Encoding::Iso8859_2 => 3,
            Encoding::Iso8859_3 => 4,
            Encoding::Iso8859_4 => 5,
            Encoding::Iso8859_5 => 6,
            Encoding::Iso8859_6 => 7,
            Encoding::Iso8859_7 => 8,
            Encoding::Iso8859_8 => 9,
            Encoding::Iso8859_9 => 10,
            Encoding::Iso8859_10 => 11,
            Encoding::Iso8859_11 => 12,
            // 13 was reserved for ISO-8859-12, which was never published
            Encoding::Iso8859_13 => 14,
            Encoding::Iso8859_14 => 15,
            Encoding::Iso8859_15 => 16,
            Encoding::Iso8859_16 => 17,
            Encoding::Windows1250 => 18,
            Encoding::Windows1251 => 19,
            Encoding::Windows1252 => 20,
            Encoding::Windows1253 => 21,
            Encoding::Windows1254 => 22,
            Encoding::Windows1255 => 23,
            Encoding::Windows1256 => 24,
            Encoding::Windows1257 => 25,
            Encoding::Windows1258 => 26,
            Encoding::Utf16Be => 63,
            Encoding::Utf16Le => 64,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Encoding::Ascii),
            1 => Some(Encoding::Iso8859_1),
            2 => Some(Encoding::Utf8),
            3..=12 => Some(ISO_8859[(code - 2) as usize]),
            14..=17 => Some(ISO_8859[(code - 3) as usize]),
            18..=26 => Some(WINDOWS[(code - 18) as usize]),
            63 => Some(Encoding::Utf16Be),
            64 => Some(Encoding::Utf16Le),
            _ => None,
        }
    }

    /// Canonical name, as it would appear in an XML declaration
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "US-ASCII",
            Encoding::Iso8859_1 => "ISO-8859-1",
            Encoding::Utf8 => "UTF-8",
            Encoding::Iso8859_2 => "ISO-8859-2",
            Encoding::Iso8859_3 => "ISO-8859-3",
            Encoding::Iso8859_4 => "ISO-8859-4",
            Encoding::Iso8859_5 => "ISO-8859-5",
            Encoding::Iso8859_6 => "ISO-8859-6",
            Encoding::Iso8859_7 => "ISO-8859-7",
            Encoding::Iso8859_8 => "ISO-8859-8",
            Encoding::Iso8859_9 => "ISO-8859-9",
            Encoding::Iso8859_10 => "ISO-8859-10",
            Encoding::Iso8859_11 => "ISO-8859-11",
            Encoding::Iso8859_13 => "ISO-8859-13",
            Encoding::Iso8859_14 => "ISO-8859-14",
            Encoding::Iso8859_15 => "ISO-8859-15",
            Encoding::Iso8859_16 => "ISO-8859-16",
            Encoding::Windows1250 => "WINDOWS-1250",
            Encoding::Windows1251 => "WINDOWS-1251",
            Encoding::Windows1252 => "WINDOWS-1252",
            Encoding::Windows1253 => "WINDOWS-1253",
            Encoding::Windows1254 => "WINDOWS-1254",
            Encoding::Windows1255 => "WINDOWS-1255",
            Encoding::Windows1256 => "WINDOWS-1256",
            Encoding::Windows1257 => "WINDOWS-1257",
            Encoding::Windows1258 => "WINDOWS-1258",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf16Le => "UTF-16LE",
        }
    }

    /// Resolve a declared encoding name (case-insensitive).
    ///
    /// Bare `UTF-16` is not an encoding on its own: its byte order comes from
    /// the BOM, so callers handle it before asking here.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.to_ascii_uppercase();
        match label.as_str() {
            "ASCII" | "US-ASCII" => return Some(Encoding::Ascii),
            "UTF-8" => return Some(Encoding::Utf8),
            "UTF-16LE" => return Some(Encoding::Utf16Le),
            "UTF-16BE" => return Some(Encoding::Utf16Be),
            _ => {}
        }
        if let Some(n) = label.strip_prefix("ISO-8859-") {
            return match n.parse::<u8>().ok()? {
                n @ 1..=11 => Some(ISO_8859[(n - 1) as usize]),
                n @ 13..=16 => Some(ISO_8859[(n - 2) as usize]),
                _ => None,
            };
        }
        let n = label
            .strip_prefix("WINDOWS-")
            .or_else(|| label.strip_prefix("CP"))?;
        match n.parse::<u16>().ok()? {
            n @ 1250..=1258 => Some(WINDOWS[(n - 1250) as usize]),
            _ => None,
        }
    }

    #[inline]
    pub fn is_utf16(self) -> bool {
        matches!(self, Encoding::Utf16Be | Encoding::Utf16Le)
    }

    /// Everything except UTF-16 addresses characters by byte offset
    #[inline]
    pub fn is_single_byte(self) -> bool {
        !self.is_utf16()
    }

    /// Bytes per code unit
    #[inline]
    pub fn increment(self) -> usize {
        if self.is_utf16() {
            2
        } else {
            1
        }
    }

    /// Shift converting byte offsets to the character units stored in tokens
    #[inline]
    pub fn unit_shift(self) -> u32 {
        if self.is_utf16() {
            1
        } else {
            0
        }
    }

    /// Build the byte decoder for this encoding
    pub fn decoder(self) -> Box<dyn ByteDecoder> {
        decoder::for_encoding(self)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order mark found at the start of the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bom {
    None,
    Utf8,
    Utf16,
}

/// Outcome of sniffing the first bytes of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub encoding: Encoding,
    pub bom: Bom,
    /// Bytes of BOM to skip before lexing
    pub consumed: usize,
}

/// Detect the encoding of `doc[offset..end]` from its leading bytes.
///
/// Fails on an empty range, a truncated or unknown BOM, NUL bytes that do
/// not start an unmarked UTF-16 `<?`, or a document whose end offset cannot
/// be packed into a token record.
pub fn sniff(doc: &[u8], offset: usize, end: usize, namespace_aware: bool) -> Result<Sniffed> {
    if end <= offset {
        return Err(ParseError::encoding("document is zero sized"));
    }
    let head = &doc[offset..end];
    let sniffed = match head {
        [0xFE, 0xFF, ..] => Sniffed {
            encoding: Encoding::Utf16Be,
            bom: Bom::Utf16,
            consumed: 2,
        },
        [0xFE, ..] => return Err(ParseError::encoding("unknown byte order mark FE")),
        [0xFF, 0xFE, ..] => Sniffed {
            encoding: Encoding::Utf16Le,
            bom: Bom::Utf16,
            consumed: 2,
        },
        [0xFF, ..] => return Err(ParseError::encoding("unknown byte order mark FF")),
        [0xEF, 0xBB, 0xBF, ..] => Sniffed {
            encoding: Encoding::Utf8,
            bom: Bom::Utf8,
            consumed: 3,
        },
        [0xEF, ..] => return Err(ParseError::encoding("unknown byte order mark EF")),
        [0x00, 0x3C, 0x00, 0x3F, ..] => Sniffed {
            encoding: Encoding::Utf16Be,
            bom: Bom::None,
            consumed: 0,
        },
        [0x3C, 0x00, 0x3F, 0x00, ..] => Sniffed {
            encoding: Encoding::Utf16Le,
            bom: Bom::None,
            consumed: 0,
        },
        [0x00, ..] => return Err(ParseError::encoding("not UTF-16BE")),
        [0x3C, 0x00, ..] => return Err(ParseError::encoding("not UTF-16LE")),
        _ => Sniffed {
            encoding: Encoding::Utf8,
            bom: Bom::None,
            consumed: 0,
        },
    };
    check_size(sniffed.encoding, end, namespace_aware)?;
    Ok(sniffed)
}

/// Token offsets are 32-bit; namespace mode on single-byte documents keeps
/// one bit in reserve.
pub fn check_size(encoding: Encoding, end: usize, namespace_aware: bool) -> Result<()> {
    let limit = if namespace_aware && encoding.is_single_byte() {
        MAX_NS_DOC_SIZE
    } else {
        MAX_DOC_SIZE
    };
    if end >= limit {
        return Err(ParseError::encoding(format!(
            "document size exceeds the {} byte addressing limit",
            limit
        )));
    }
    Ok(())
}

//! Token Records
//!
//! Every lexical unit is one 64-bit record:
//!
//! ```text
//!  63   60 59      52 51              32 31                              0
//! +-------+----------+------------------+---------------------------------+
//! | type  |  depth   |      length      |             offset              |
//! +-------+----------+------------------+---------------------------------+
//!   4 bit    8 bit        20 bit                     32 bit
//! ```
//!
//! Offsets and lengths count characters: bytes for single-byte encodings,
//! 16-bit units for UTF-16. Depth -1 (document level) is stored as `0xFF`.
//! Qualified names (start tags, attribute names) split the length field
//! into a 9-bit prefix length and an 11-bit full name length.

/// Deepest element nesting the depth field can carry
pub const MAX_DEPTH: i32 = 254;
/// Longest token the 20-bit length field can carry
pub const MAX_TOKEN_LENGTH: u32 = (1 << 20) - 1;
/// Longest namespace prefix of a qualified name
pub const MAX_PREFIX_LENGTH: u32 = (1 << 9) - 1;
/// Longest qualified name
pub const MAX_QNAME_LENGTH: u32 = (1 << 11) - 1;

const TYPE_SHIFT: u32 = 60;
const DEPTH_SHIFT: u32 = 52;
const LENGTH_SHIFT: u32 = 32;
const PREFIX_SHIFT: u32 = 11;

const DEPTH_MASK: u64 = 0xFF;
const LENGTH_MASK: u64 = 0xF_FFFF;
const OFFSET_MASK: u64 = 0xFFFF_FFFF;

/// Kind of a lexical unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    StartTag = 0,
    EndTag = 1,
    AttrName = 2,
    AttrNs = 3,
    AttrVal = 4,
    CharacterData = 5,
    Comment = 6,
    PiName = 7,
    PiVal = 8,
    DecAttrName = 9,
    DecAttrVal = 10,
    Cdata = 11,
    DtdVal = 12,
    Document = 13,
}

impl TokenType {
    pub fn from_code(code: u8) -> Option<Self> {
        use TokenType::*;
        Some(match code {
            0 => StartTag,
            1 => EndTag,
            2 => AttrName,
            3 => AttrNs,
            4 => AttrVal,
            5 => CharacterData,
            6 => Comment,
            7 => PiName,
            8 => PiVal,
            9 => DecAttrName,
            10 => DecAttrVal,
            11 => Cdata,
            12 => DtdVal,
            13 => Document,
            _ => return None,
        })
    }

    /// Whether the length field holds a prefix/name pair
    #[inline]
    pub fn is_qualified(self) -> bool {
        matches!(self, TokenType::StartTag | TokenType::AttrName | TokenType::AttrNs)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::StartTag => "start_tag",
            TokenType::EndTag => "end_tag",
            TokenType::AttrName => "attr_name",
            TokenType::AttrNs => "attr_ns",
            TokenType::AttrVal => "attr_val",
            TokenType::CharacterData => "character_data",
            TokenType::Comment => "comment",
            TokenType::PiName => "pi_name",
            TokenType::PiVal => "pi_val",
            TokenType::DecAttrName => "dec_attr_name",
            TokenType::DecAttrVal => "dec_attr_val",
            TokenType::Cdata => "cdata",
            TokenType::DtdVal => "dtd_val",
            TokenType::Document => "document",
        }
    }
}

/// Pack a prefix length and a full qualified-name length into the 20-bit
/// length field.
#[inline]
pub fn qualified_length(prefix_len: u32, qname_len: u32) -> u32 {
    debug_assert!(prefix_len <= MAX_PREFIX_LENGTH);
    debug_assert!(qname_len <= MAX_QNAME_LENGTH);
    (prefix_len << PREFIX_SHIFT) | qname_len
}

/// One packed token record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PackedToken(u64);

impl PackedToken {
    #[inline]
    pub fn new(kind: TokenType, depth: i32, offset: u32, length: u32) -> Self {
        debug_assert!((-1..=MAX_DEPTH).contains(&depth), "depth {} out of range", depth);
        debug_assert!(length <= MAX_TOKEN_LENGTH, "length {} out of range", length);
        let depth = (depth as u64) & DEPTH_MASK;
        PackedToken(
            ((kind as u64) << TYPE_SHIFT)
                | (depth << DEPTH_SHIFT)
                | (((length as u64) & LENGTH_MASK) << LENGTH_SHIFT)
                | offset as u64,
        )
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        TokenType::from_code((raw >> TYPE_SHIFT) as u8).map(|_| PackedToken(raw))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn kind(self) -> TokenType {
        // Only constructed through `new`/`from_raw`, so the code is valid
        TokenType::from_code((self.0 >> TYPE_SHIFT) as u8).unwrap_or(TokenType::Document)
    }

    /// Nesting depth; -1 at document level
    #[inline]
    pub fn depth(self) -> i32 {
        match (self.0 >> DEPTH_SHIFT) & DEPTH_MASK {
            0xFF => -1,
            d => d as i32,
        }
    }

    /// Raw 20-bit length field
    #[inline]
    pub fn length_field(self) -> u32 {
        ((self.0 >> LENGTH_SHIFT) & LENGTH_MASK) as u32
    }

    #[inline]
    pub fn offset(self) -> u32 {
        (self.0 & OFFSET_MASK) as u32
    }

    /// Same record moved back by `delta` characters. The document token
    /// stays at 0.
    #[inline]
    pub(crate) fn rebased(self, delta: u32) -> Self {
        let offset = self.offset().saturating_sub(delta);
        PackedToken((self.0 & !OFFSET_MASK) | offset as u64)
    }

    pub fn unpack(self) -> Token {
        Token {
            kind: self.kind(),
            depth: self.depth(),
            offset: self.offset(),
            length: self.length_field(),
        }
    }
}

/// Unpacked view of a token record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenType,
    pub depth: i32,
    pub offset: u32,
    /// Raw length field; see `len` for qualified names
    pub length: u32,
}

impl Token {
    /// Length in characters of the whole token
    #[inline]
    pub fn len(&self) -> u32 {
        if self.kind.is_qualified() {
            self.length & MAX_QNAME_LENGTH
        } else {
            self.length
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prefix length of a qualified name, 0 when unprefixed
    #[inline]
    pub fn prefix_len(&self) -> u32 {
        if self.kind.is_qualified() {
            self.length >> PREFIX_SHIFT
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_fields() {
        let t = PackedToken::new(TokenType::CharacterData, 3, 1234, 56);
        assert_eq!(t.kind(), TokenType::CharacterData);
        assert_eq!(t.depth(), 3);
        assert_eq!(t.offset(), 1234);
        assert_eq!(t.length_field(), 56);
    }

    #[test]
    fn test_document_depth() {
        let t = PackedToken::new(TokenType::Document, -1, 0, 0);
        assert_eq!(t.depth(), -1);
        assert_eq!((t.raw() >> 52) & 0xFF, 0xFF);
        assert_eq!(t.raw() >> 60, 13);
    }

    #[test]
    fn test_field_extremes() {
        let t = PackedToken::new(TokenType::DtdVal, MAX_DEPTH, u32::MAX, MAX_TOKEN_LENGTH);
        assert_eq!(t.kind(), TokenType::DtdVal);
        assert_eq!(t.depth(), MAX_DEPTH);
        assert_eq!(t.offset(), u32::MAX);
        assert_eq!(t.length_field(), MAX_TOKEN_LENGTH);
    }

    #[test]
    fn test_qualified_length() {
        let length = qualified_length(3, 7);
        let t = PackedToken::new(TokenType::StartTag, 0, 1, length).unpack();
        assert_eq!(t.prefix_len(), 3);
        assert_eq!(t.len(), 7);

        let text = PackedToken::new(TokenType::CharacterData, 0, 1, length).unpack();
        assert_eq!(text.prefix_len(), 0);
        assert_eq!(text.len(), length);
    }

    #[test]
    fn test_from_raw_rejects_unknown_type() {
        assert!(PackedToken::from_raw(14u64 << 60).is_none());
        assert!(PackedToken::from_raw(5u64 << 60).is_some());
    }

    #[test]
    fn test_rebased() {
        let t = PackedToken::new(TokenType::AttrVal, 1, 100, 4).rebased(40);
        assert_eq!(t.offset(), 60);
        assert_eq!(t.kind(), TokenType::AttrVal);
        assert_eq!(t.depth(), 1);
        assert_eq!(t.length_field(), 4);
    }
}

//! VTD Index
//!
//! The immutable product of a parse: the document bytes, the packed token
//! buffer, the location cache and the few scalars a navigator needs.
//! Strings are never copied out of the document; tokens are (offset, length)
//! pairs into it.

use crate::core::encoding::Encoding;
use crate::error::{ParseError, Result};

use super::location::LocationCache;
use super::token::{PackedToken, Token};

#[derive(Clone, PartialEq, Eq)]
pub struct VtdIndex {
    pub(crate) doc: Vec<u8>,
    pub(crate) doc_offset: usize,
    pub(crate) doc_len: usize,
    pub(crate) encoding: Encoding,
    pub(crate) namespace_aware: bool,
    pub(crate) max_depth: u8,
    pub(crate) root: Option<u32>,
    pub(crate) tokens: Vec<PackedToken>,
    pub(crate) lc: LocationCache,
}

impl VtdIndex {
    #[inline]
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Token at `index`; panics when out of range, see `get_token`
    #[inline]
    pub fn token(&self, index: usize) -> Token {
        self.tokens[index].unpack()
    }

    #[inline]
    pub fn get_token(&self, index: usize) -> Option<Token> {
        self.tokens.get(index).map(|t| t.unpack())
    }

    #[inline]
    pub fn packed_tokens(&self) -> &[PackedToken] {
        &self.tokens
    }

    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.tokens.iter().map(|t| t.unpack())
    }

    /// Token index of the root element's start tag
    #[inline]
    pub fn root_index(&self) -> Option<u32> {
        self.root
    }

    #[inline]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[inline]
    pub fn is_namespace_aware(&self) -> bool {
        self.namespace_aware
    }

    /// Deepest element depth seen
    #[inline]
    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    #[inline]
    pub fn location_cache(&self) -> &LocationCache {
        &self.lc
    }

    /// Whole buffer the document was parsed from
    #[inline]
    pub fn buffer(&self) -> &[u8] {
        &self.doc
    }

    /// Byte range of the document inside `buffer()`
    #[inline]
    pub fn doc_offset(&self) -> usize {
        self.doc_offset
    }

    #[inline]
    pub fn doc_len(&self) -> usize {
        self.doc_len
    }

    /// The document bytes
    #[inline]
    pub fn document(&self) -> &[u8] {
        &self.doc[self.doc_offset..self.doc_offset + self.doc_len]
    }

    /// Raw bytes a token covers
    pub fn raw_bytes(&self, index: usize) -> &[u8] {
        let t = self.token(index);
        let shift = self.encoding.unit_shift();
        let start = (t.offset as usize) << shift;
        let len = (t.len() as usize) << shift;
        &self.doc[start..start + len]
    }

    /// Decode a token's raw text; entity references are left as written
    pub fn raw_string(&self, index: usize) -> Result<String> {
        let bytes = self.raw_bytes(index);
        if matches!(self.encoding, Encoding::Utf8 | Encoding::Ascii) {
            return String::from_utf8(bytes.to_vec())
                .map_err(|_| ParseError::encoding("token is not valid UTF-8"));
        }
        let decoder = self.encoding.decoder();
        let mut out = String::with_capacity(bytes.len());
        let mut offset = 0;
        while offset < bytes.len() {
            let (cp, width) = decoder.decode(bytes, offset)?;
            out.push(char::from_u32(cp).ok_or_else(|| ParseError::encoding("invalid code point"))?);
            offset += width;
        }
        Ok(out)
    }

    /// Size in bytes of the combined index file for this document
    pub fn index_size(&self) -> usize {
        super::persist::encoded_size(self, true)
    }

    /// Give up ownership of the buffers
    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<PackedToken>, LocationCache) {
        (self.doc, self.tokens, self.lc)
    }
}

impl std::fmt::Debug for VtdIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VtdIndex")
            .field("doc_offset", &self.doc_offset)
            .field("doc_len", &self.doc_len)
            .field("encoding", &self.encoding)
            .field("namespace_aware", &self.namespace_aware)
            .field("max_depth", &self.max_depth)
            .field("root", &self.root)
            .field("tokens", &self.tokens.len())
            .field("lc_levels", &self.lc.levels())
            .finish()
    }
}

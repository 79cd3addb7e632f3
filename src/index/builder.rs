//! Index Builder
//!
//! Owns the growable token and location cache buffers while a document is
//! lexed. The lexer calls one of three writers:
//! - `write`: a plain token
//! - `write_element`: a start tag, also threaded into the location cache
//! - `write_text`: character-data-like tokens, split when longer than the
//!   length field allows
//!
//! The builder doubles as the buffer arena of a `VtdGen`: `reset` clears the
//! logical sizes but keeps the allocations, and `reclaim` takes the buffers of
//! a finished index back.

use super::location::{LcThreader, LocationCache};
use super::token::{PackedToken, TokenType, MAX_TOKEN_LENGTH};

/// Builder state for one document
pub struct IndexBuilder {
    tokens: Vec<PackedToken>,
    lc: LocationCache,
    threader: LcThreader,
    root: Option<u32>,
}

/// Initial (tokens, entries per LC level) for a document size.
///
/// Small documents get small floors; beyond 256 KiB we assume roughly one
/// token per 12 bytes.
fn capacity_hint(doc_len: usize) -> (usize, usize) {
    match doc_len {
        0..=1024 => (64, 32),
        1025..=4096 => (256, 64),
        4097..=16384 => (1024, 128),
        16385..=65536 => (4096, 512),
        65537..=262144 => (16384, 2048),
        _ => (doc_len / 12, 4096),
    }
}

impl IndexBuilder {
    /// Create a builder sized for a document of `doc_len` bytes
    pub fn new(levels: usize, doc_len: usize) -> Self {
        let (tokens, per_level) = capacity_hint(doc_len);
        IndexBuilder {
            tokens: Vec::with_capacity(tokens),
            lc: LocationCache::with_capacity(levels, per_level),
            threader: LcThreader::default(),
            root: None,
        }
    }

    /// Clear for the next document, keeping allocated capacity
    pub fn reset(&mut self, levels: usize, doc_len: usize) {
        self.tokens.clear();
        self.lc.reset(levels);
        self.threader.reset();
        self.root = None;
        let (tokens, _) = capacity_hint(doc_len);
        self.tokens.reserve(tokens);
    }

    /// Take back the buffers of a finished index
    pub fn reclaim(&mut self, tokens: Vec<PackedToken>, lc: LocationCache) {
        if tokens.capacity() > self.tokens.capacity() {
            self.tokens = tokens;
        }
        if lc.levels() == self.lc.levels() {
            self.lc = lc;
        }
        self.tokens.clear();
        let levels = self.lc.levels();
        self.lc.reset(levels);
    }

    #[inline]
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn tokens(&self) -> &[PackedToken] {
        &self.tokens
    }

    #[inline]
    pub fn root(&self) -> Option<u32> {
        self.root
    }

    #[inline]
    pub fn location_cache(&self) -> &LocationCache {
        &self.lc
    }

    /// Append a plain token
    #[inline]
    pub fn write(&mut self, kind: TokenType, offset: u32, length: u32, depth: i32) {
        self.tokens.push(PackedToken::new(kind, depth, offset, length));
    }

    /// Append a start tag and thread it into the location cache
    #[inline]
    pub fn write_element(&mut self, offset: u32, length: u32, depth: i32) {
        let index = self.tokens.len() as u32;
        self.write(TokenType::StartTag, offset, length, depth);
        if depth == 0 {
            self.root = Some(index);
        } else if depth > 0 {
            self.threader.record(&mut self.lc, depth as usize, index);
        }
    }

    /// Append a character-data-like token, splitting runs longer than the
    /// length field into contiguous same-depth pieces
    pub fn write_text(&mut self, kind: TokenType, offset: u32, length: u32, depth: i32) {
        let mut offset = offset;
        let mut remaining = length;
        while remaining > MAX_TOKEN_LENGTH {
            self.write(kind, offset, MAX_TOKEN_LENGTH, depth);
            offset += MAX_TOKEN_LENGTH;
            remaining -= MAX_TOKEN_LENGTH;
        }
        self.write(kind, offset, remaining, depth);
    }

    /// Close the location cache chain left open by the last element
    pub fn finish(&mut self) {
        self.threader.finish(&mut self.lc);

        // Enable by setting VTDXML_DEBUG_INDEX=1 environment variable
        #[cfg(feature = "memory_tracking")]
        if std::env::var("VTDXML_DEBUG_INDEX").is_ok() {
            eprintln!(
                "[INDEX] tokens:{} (capacity {}), lc levels:{}, lc bytes:{}",
                self.tokens.len(),
                self.tokens.capacity(),
                self.lc.levels(),
                self.lc.byte_size()
            );
        }
    }

    /// Move the buffers out, leaving an empty builder with the same level
    /// count behind
    pub fn take(&mut self) -> (Vec<PackedToken>, LocationCache, Option<u32>) {
        let levels = self.lc.levels();
        let tokens = std::mem::take(&mut self.tokens);
        let lc = std::mem::replace(&mut self.lc, LocationCache::new(levels));
        self.threader.reset();
        (tokens, lc, self.root.take())
    }
}

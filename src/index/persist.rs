//! Index Persistence
//!
//! Binary file format for a `VtdIndex`, little-endian throughout:
//!
//! ```text
//! header (32 bytes)
//!   magic "VTDX" | version u8 | encoding u8 | flags u8 | max depth u8
//!   lc levels u8 | reserved [u8; 3] | root u32 | doc offset u64 | doc len u64
//! document bytes, padded to 8        (combined files only)
//! token count u64 | tokens u64 * n
//! per upper LC level: count u64 | entries u64 * n   (token << 32 | child)
//! leaf count u64 | leaves u32 * n, padded to 8
//! ```
//!
//! Version 1 files embed the document. Version 2 files ("separate index")
//! only record its length, and loading them needs the document bytes back.
//! Token offsets are rebased so the stored document always starts at 0.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::core::encoding::Encoding;
use crate::error::IndexError;

use super::location::{LcEntry, LocationCache, FULL_LEVELS, SHALLOW_LEVELS};
use super::token::PackedToken;
use super::vtd::VtdIndex;

const MAGIC: &[u8; 4] = b"VTDX";
const VERSION_COMBINED: u8 = 1;
const VERSION_SEPARATE: u8 = 2;

const FLAG_NAMESPACE_AWARE: u8 = 1;
const FLAG_EMBEDDED: u8 = 1 << 1;

const HEADER_LEN: usize = 32;
const NO_ROOT: u32 = u32::MAX;

/// Bytes needed to reach the next multiple of 8
#[inline]
fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

/// Exact size of the encoded index
pub(crate) fn encoded_size(index: &VtdIndex, embedded: bool) -> usize {
    let doc = if embedded {
        index.doc_len + padding(index.doc_len)
    } else {
        0
    };
    let upper: usize = index
        .lc
        .upper_levels()
        .iter()
        .map(|level| 8 + level.len() * 8)
        .sum();
    let leaves = index.lc.leaves().len() * 4;
    HEADER_LEN + doc + 8 + index.tokens.len() * 8 + upper + 8 + leaves + padding(leaves)
}

// ============================================================================
// Writing
// ============================================================================

impl VtdIndex {
    /// Write a combined index+document file
    pub fn write_index<W: Write>(&self, out: &mut W) -> Result<(), IndexError> {
        out.write_all(&self.to_index_bytes())?;
        Ok(())
    }

    /// Write an index that refers to the document by length only
    pub fn write_separate_index<W: Write>(&self, out: &mut W) -> Result<(), IndexError> {
        out.write_all(&self.to_separate_index_bytes())?;
        Ok(())
    }

    pub fn to_index_bytes(&self) -> Vec<u8> {
        self.encode(true)
    }

    pub fn to_separate_index_bytes(&self) -> Vec<u8> {
        self.encode(false)
    }

    pub fn write_index_file(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_index(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn write_separate_index_file(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_separate_index(&mut out)?;
        out.flush()?;
        Ok(())
    }

    fn encode(&self, embedded: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(encoded_size(self, embedded));
        let version = if embedded {
            VERSION_COMBINED
        } else {
            VERSION_SEPARATE
        };
        let mut flags = 0;
        if self.namespace_aware {
            flags |= FLAG_NAMESPACE_AWARE;
        }
        if embedded {
            flags |= FLAG_EMBEDDED;
        }

        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[
            version,
            self.encoding.code(),
            flags,
            self.max_depth,
            self.lc.levels() as u8,
            0,
            0,
            0,
        ]);
        out.extend_from_slice(&self.root.unwrap_or(NO_ROOT).to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&(self.doc_len as u64).to_le_bytes());

        if embedded {
            out.extend_from_slice(self.document());
            out.extend_from_slice(&[0u8; 8][..padding(self.doc_len)]);
        }

        let delta = (self.doc_offset >> self.encoding.unit_shift()) as u32;
        out.extend_from_slice(&(self.tokens.len() as u64).to_le_bytes());
        for token in &self.tokens {
            out.extend_from_slice(&token.rebased(delta).raw().to_le_bytes());
        }

        for level in self.lc.upper_levels() {
            out.extend_from_slice(&(level.len() as u64).to_le_bytes());
            for entry in level {
                out.extend_from_slice(&entry.to_raw().to_le_bytes());
            }
        }

        let leaves = self.lc.leaves();
        out.extend_from_slice(&(leaves.len() as u64).to_le_bytes());
        for &leaf in leaves {
            out.extend_from_slice(&leaf.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 8][..padding(leaves.len() * 4)]);
        out
    }
}

// ============================================================================
// Reading
// ============================================================================

struct Header {
    version: u8,
    encoding: Encoding,
    flags: u8,
    max_depth: u8,
    levels: usize,
    root: Option<u32>,
    doc_len: u64,
}

struct IndexReader<R> {
    inner: R,
}

impl<R: Read> IndexReader<R> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], IndexError> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn u32(&mut self) -> Result<u32, IndexError> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    fn u64(&mut self) -> Result<u64, IndexError> {
        Ok(u64::from_le_bytes(self.bytes()?))
    }

    fn count(&mut self) -> Result<usize, IndexError> {
        usize::try_from(self.u64()?).map_err(|_| IndexError::Corrupt("count out of range"))
    }

    fn skip(&mut self, n: usize) -> Result<(), IndexError> {
        let mut pad = [0u8; 8];
        self.inner.read_exact(&mut pad[..n])?;
        Ok(())
    }

    fn header(&mut self) -> Result<Header, IndexError> {
        if &self.bytes::<4>()? != MAGIC {
            return Err(IndexError::BadMagic);
        }
        let [version, encoding, flags, max_depth, levels, _, _, _] = self.bytes::<8>()?;
        if version != VERSION_COMBINED && version != VERSION_SEPARATE {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let encoding = Encoding::from_code(encoding).ok_or(IndexError::UnknownEncoding(encoding))?;
        let levels = levels as usize;
        if levels != SHALLOW_LEVELS && levels != FULL_LEVELS {
            return Err(IndexError::Corrupt("location cache level count"));
        }
        let root = match self.u32()? {
            NO_ROOT => None,
            r => Some(r),
        };
        if self.u64()? != 0 {
            return Err(IndexError::Corrupt("document offset"));
        }
        let doc_len = self.u64()?;
        if (version == VERSION_COMBINED) != (flags & FLAG_EMBEDDED != 0) {
            return Err(IndexError::Corrupt("embedded flag does not match version"));
        }
        Ok(Header {
            version,
            encoding,
            flags,
            max_depth,
            levels,
            root,
            doc_len,
        })
    }

    fn body(&mut self, header: Header, doc: Vec<u8>) -> Result<VtdIndex, IndexError> {
        let n = self.count()?;
        let mut tokens = Vec::with_capacity(n.min(1 << 20));
        for _ in 0..n {
            let token = PackedToken::from_raw(self.u64()?).ok_or(IndexError::Corrupt("token type"))?;
            tokens.push(token);
        }

        let mut upper = Vec::with_capacity(header.levels - 1);
        for _ in 0..header.levels - 1 {
            let n = self.count()?;
            let mut level = Vec::with_capacity(n.min(1 << 20));
            for _ in 0..n {
                level.push(LcEntry::from_raw(self.u64()?));
            }
            upper.push(level);
        }
        let n = self.count()?;
        let mut leaves = Vec::with_capacity(n.min(1 << 20));
        for _ in 0..n {
            leaves.push(self.u32()?);
        }
        self.skip(padding(n * 4))?;

        if let Some(root) = header.root {
            if root as usize >= tokens.len() {
                return Err(IndexError::Corrupt("root pointer"));
            }
        }
        check_token_ranges(&tokens, header.encoding, doc.len())?;
        check_lc_links(&upper, &leaves, tokens.len())?;

        Ok(VtdIndex {
            doc_len: doc.len(),
            doc,
            doc_offset: 0,
            encoding: header.encoding,
            namespace_aware: header.flags & FLAG_NAMESPACE_AWARE != 0,
            max_depth: header.max_depth,
            root: header.root,
            tokens,
            lc: LocationCache::from_parts(upper, leaves),
        })
    }
}

/// Every token must lie inside the document
fn check_token_ranges(tokens: &[PackedToken], encoding: Encoding, doc_len: usize) -> Result<(), IndexError> {
    let shift = encoding.unit_shift();
    for token in tokens {
        let t = token.unpack();
        let end = (t.offset as u64 + t.len() as u64) << shift;
        if end > doc_len as u64 {
            return Err(IndexError::Corrupt("token range outside the document"));
        }
    }
    Ok(())
}

/// LC entries point at tokens, and `first_child` at an entry of the next level
fn check_lc_links(upper: &[Vec<LcEntry>], leaves: &[u32], token_count: usize) -> Result<(), IndexError> {
    for (i, level) in upper.iter().enumerate() {
        let next_len = upper.get(i + 1).map_or(leaves.len(), Vec::len);
        for entry in level {
            if entry.token as usize >= token_count {
                return Err(IndexError::Corrupt("location cache token"));
            }
            if entry.first_child.is_some_and(|child| child as usize >= next_len) {
                return Err(IndexError::Corrupt("location cache child"));
            }
        }
    }
    if leaves.iter().any(|&leaf| leaf as usize >= token_count) {
        return Err(IndexError::Corrupt("location cache token"));
    }
    Ok(())
}

impl VtdIndex {
    /// Load a combined index+document file
    pub fn read_index<R: Read>(input: R) -> Result<VtdIndex, IndexError> {
        let mut reader = IndexReader { inner: input };
        let header = reader.header()?;
        if header.version != VERSION_COMBINED {
            return Err(IndexError::MissingDocument);
        }
        let doc_len = usize::try_from(header.doc_len)
            .map_err(|_| IndexError::Corrupt("document length"))?;
        let mut doc = Vec::new();
        (&mut reader.inner)
            .take(header.doc_len)
            .read_to_end(&mut doc)?;
        if doc.len() != doc_len {
            return Err(IndexError::DocumentSizeMismatch {
                expected: header.doc_len,
                actual: doc.len() as u64,
            });
        }
        reader.skip(padding(doc_len))?;
        reader.body(header, doc)
    }

    /// Load an index of either kind against the given document bytes.
    ///
    /// The document must be exactly as long as the one that was indexed.
    pub fn read_separate_index<R: Read>(input: R, doc: Vec<u8>) -> Result<VtdIndex, IndexError> {
        let mut reader = IndexReader { inner: input };
        let header = reader.header()?;
        if header.doc_len != doc.len() as u64 {
            return Err(IndexError::DocumentSizeMismatch {
                expected: header.doc_len,
                actual: doc.len() as u64,
            });
        }
        if header.version == VERSION_COMBINED {
            let doc_len = doc.len();
            let mut skipped = 0u64;
            let mut sink = [0u8; 4096];
            let mut embedded = (&mut reader.inner).take(header.doc_len);
            loop {
                let n = embedded.read(&mut sink)?;
                if n == 0 {
                    break;
                }
                skipped += n as u64;
            }
            if skipped != header.doc_len {
                return Err(IndexError::Corrupt("truncated embedded document"));
            }
            reader.skip(padding(doc_len))?;
        }
        reader.body(header, doc)
    }

    pub fn load_index_file(path: impl AsRef<Path>) -> Result<VtdIndex, IndexError> {
        Self::read_index(BufReader::new(File::open(path)?))
    }

    /// Load a separate index file together with the document file it indexes
    pub fn load_separate_index_files(
        xml_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
    ) -> Result<VtdIndex, IndexError> {
        let doc = std::fs::read(xml_path)?;
        Self::read_separate_index(BufReader::new(File::open(index_path)?), doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LcDepth, ParserConfig};
    use crate::generator::VtdGen;
    use pretty_assertions::assert_eq;

    const DOC: &[u8] = b"<?xml version='1.0'?><!-- c --><r xmlns:p='urn:p'><p:a x='1'>t</p:a><b><c><d/></c></b></r><?pi v?>";

    fn parse(config: ParserConfig, doc: &[u8]) -> VtdIndex {
        VtdGen::with_config(config).parse(doc.to_vec(), true).unwrap()
    }

    #[test]
    fn test_combined_round_trip() {
        let index = parse(ParserConfig::default(), DOC);
        let bytes = index.to_index_bytes();
        assert_eq!(bytes.len(), index.index_size());
        let loaded = VtdIndex::read_index(&bytes[..]).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_full_depth_round_trip() {
        let config = ParserConfig {
            lc_depth: LcDepth::Full,
            ..ParserConfig::default()
        };
        let index = parse(config, DOC);
        assert_eq!(index.location_cache().levels(), 5);
        let loaded = VtdIndex::read_index(&index.to_index_bytes()[..]).unwrap();
        assert_eq!(loaded.location_cache(), index.location_cache());
        assert_eq!(loaded.packed_tokens(), index.packed_tokens());
    }

    #[test]
    fn test_sub_range_is_rebased() {
        let mut buffer = b"garbage!".to_vec();
        buffer.extend_from_slice(DOC);
        let index = VtdGen::new().parse_range(buffer, 8, DOC.len(), true).unwrap();
        let plain = parse(ParserConfig::default(), DOC);
        let loaded = VtdIndex::read_index(&index.to_index_bytes()[..]).unwrap();
        assert_eq!(loaded.packed_tokens(), plain.packed_tokens());
        assert_eq!(loaded.document(), DOC);
    }

    #[test]
    fn test_separate_round_trip() {
        let index = parse(ParserConfig::default(), DOC);
        let bytes = index.to_separate_index_bytes();
        assert!(bytes.len() < index.to_index_bytes().len());
        let loaded = VtdIndex::read_separate_index(&bytes[..], DOC.to_vec()).unwrap();
        assert_eq!(loaded, index);
        assert!(matches!(
            VtdIndex::read_index(&bytes[..]),
            Err(IndexError::MissingDocument)
        ));
    }

    #[test]
    fn test_separate_size_check() {
        let index = parse(ParserConfig::default(), DOC);
        let bytes = index.to_separate_index_bytes();
        let err = VtdIndex::read_separate_index(&bytes[..], b"<r/>".to_vec()).unwrap_err();
        assert!(matches!(err, IndexError::DocumentSizeMismatch { expected, actual: 4 } if expected == DOC.len() as u64));
    }

    #[test]
    fn test_bad_input() {
        assert!(matches!(VtdIndex::read_index(&b"NOPE"[..]), Err(IndexError::BadMagic)));
        let index = parse(ParserConfig::default(), DOC);
        let mut bytes = index.to_index_bytes();
        bytes[4] = 9;
        assert!(matches!(VtdIndex::read_index(&bytes[..]), Err(IndexError::UnsupportedVersion(9))));
        let bytes = index.to_index_bytes();
        let truncated = &bytes[..bytes.len() - 12];
        assert!(matches!(VtdIndex::read_index(truncated), Err(IndexError::Io(_))));
    }

    /// Offset of the token buffer's first record in a combined file
    fn tokens_at(index: &VtdIndex) -> usize {
        HEADER_LEN + index.doc_len() + padding(index.doc_len()) + 8
    }

    #[test]
    fn test_token_outside_document() {
        let index = VtdGen::new().parse(b"<r>hello</r>".to_vec(), false).unwrap();
        let mut bytes = index.to_index_bytes();
        // high byte of token 2's offset
        bytes[tokens_at(&index) + 2 * 8 + 3] = 0xF0;
        assert!(matches!(
            VtdIndex::read_index(&bytes[..]),
            Err(IndexError::Corrupt("token range outside the document"))
        ));

        let mut separate = index.to_separate_index_bytes();
        separate[HEADER_LEN + 8 + 2 * 8 + 3] = 0xF0;
        assert!(matches!(
            VtdIndex::read_separate_index(&separate[..], b"<r>hello</r>".to_vec()),
            Err(IndexError::Corrupt(_))
        ));
    }

    #[test]
    fn test_token_length_past_document_end() {
        let index = VtdGen::new().parse(b"<r>hello</r>".to_vec(), false).unwrap();
        let mut bytes = index.to_index_bytes();
        // length field starts at bit 32; bump token 2's length from 5 to 13
        let at = tokens_at(&index) + 2 * 8 + 4;
        bytes[at] = 13;
        assert!(matches!(VtdIndex::read_index(&bytes[..]), Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn test_location_cache_links_checked() {
        let index = parse(ParserConfig::default(), DOC);
        assert!(!index.location_cache().entries(1).is_empty());
        let level1 = tokens_at(&index) + index.token_count() * 8 + 8;

        let mut bad_token = index.to_index_bytes();
        bad_token[level1 + 4..level1 + 8].copy_from_slice(&0x7FFF_FFFFu32.to_le_bytes());
        assert!(matches!(
            VtdIndex::read_index(&bad_token[..]),
            Err(IndexError::Corrupt("location cache token"))
        ));

        let mut bad_child = index.to_index_bytes();
        bad_child[level1..level1 + 4].copy_from_slice(&0x7FFF_FFFFu32.to_le_bytes());
        assert!(matches!(
            VtdIndex::read_index(&bad_child[..]),
            Err(IndexError::Corrupt("location cache child"))
        ));
    }

    #[test]
    fn test_files() {
        let dir = tempfile::tempdir().unwrap();
        let xml_path = dir.path().join("doc.xml");
        let combined = dir.path().join("doc.vxl");
        let separate = dir.path().join("doc.vtd");
        std::fs::write(&xml_path, DOC).unwrap();

        let index = parse(ParserConfig::default(), DOC);
        index.write_index_file(&combined).unwrap();
        index.write_separate_index_file(&separate).unwrap();

        assert_eq!(VtdIndex::load_index_file(&combined).unwrap(), index);
        assert_eq!(VtdIndex::load_separate_index_files(&xml_path, &separate).unwrap(), index);
        assert_eq!(VtdIndex::load_separate_index_files(&xml_path, &combined).unwrap(), index);
    }
}

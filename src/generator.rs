//! VTD Generator
//!
//! `VtdGen` is the reusable entry point: it owns the configuration, the
//! namespace scope stack and a buffer arena, and turns a document buffer
//! into a `VtdIndex`. One generator parses one document at a time; use one
//! generator per thread for concurrent parsing.
//!
//! ```text
//! parse_range(doc, offset, len, ns)
//!   ├── validate the range
//!   ├── sniff encoding / BOM, check size limits
//!   ├── Lexer::run  → tokens + location cache into the builder
//!   └── VtdIndex { doc, tokens, lc, root, encoding, ... }
//! ```

use crate::config::ParserConfig;
use crate::core::encoding::sniff;
use crate::core::namespace::NamespaceResolver;
use crate::core::tokenizer::Lexer;
use crate::error::{ParseError, Result};
use crate::index::builder::IndexBuilder;
use crate::index::location::SHALLOW_LEVELS;
use crate::index::vtd::VtdIndex;

pub struct VtdGen {
    pub(crate) config: ParserConfig,
    /// Buffers reused by `parse_reusing`
    arena: IndexBuilder,
    resolver: NamespaceResolver,
    /// Result of the last file-based parse
    pub(crate) last: Option<VtdIndex>,
}

impl Default for VtdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl VtdGen {
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    pub fn with_config(config: ParserConfig) -> Self {
        VtdGen {
            config,
            arena: IndexBuilder::new(SHALLOW_LEVELS, 0),
            resolver: NamespaceResolver::new(),
            last: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a whole buffer
    pub fn parse(&mut self, doc: Vec<u8>, namespace_aware: bool) -> Result<VtdIndex> {
        let len = doc.len();
        self.parse_range(doc, 0, len, namespace_aware)
    }

    /// Parse `doc[offset..offset + len]`. Token offsets stay relative to the
    /// start of `doc`.
    pub fn parse_range(&mut self, doc: Vec<u8>, offset: usize, len: usize, namespace_aware: bool) -> Result<VtdIndex> {
        let levels = self.config.lc_depth.levels_for(len);
        let mut builder = IndexBuilder::new(levels, len);
        generate(&self.config, &mut self.resolver, &mut builder, doc, offset, len, namespace_aware)
    }

    /// Like `parse_range`, but builds into the generator's arena. Buffers
    /// handed back through `recycle` are reused instead of reallocated.
    pub fn parse_reusing(
        &mut self,
        doc: Vec<u8>,
        offset: usize,
        len: usize,
        namespace_aware: bool,
    ) -> Result<VtdIndex> {
        let levels = self.config.lc_depth.levels_for(len);
        self.arena.reset(levels, len);
        generate(&self.config, &mut self.resolver, &mut self.arena, doc, offset, len, namespace_aware)
    }

    /// Return an index's buffers to the arena and give back its document
    pub fn recycle(&mut self, index: VtdIndex) -> Vec<u8> {
        let (doc, tokens, lc) = index.into_parts();
        self.arena.reclaim(tokens, lc);
        doc
    }

    /// Drop all retained buffers and any stored result
    pub fn reset(&mut self) {
        self.arena = IndexBuilder::new(SHALLOW_LEVELS, 0);
        self.resolver.reset();
        self.last = None;
    }

    /// Index produced by the last successful `parse_file`,
    /// `parse_gzip_file` or `parse_zip_file`
    pub fn take_index(&mut self) -> Option<VtdIndex> {
        self.last.take()
    }
}

fn generate(
    config: &ParserConfig,
    resolver: &mut NamespaceResolver,
    builder: &mut IndexBuilder,
    doc: Vec<u8>,
    offset: usize,
    len: usize,
    namespace_aware: bool,
) -> Result<VtdIndex> {
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= doc.len())
        .ok_or_else(|| {
            ParseError::syntax(format!(
                "invalid document range {offset}+{len} for a buffer of {} bytes",
                doc.len()
            ))
        })?;

    tracing::debug!(
        doc_len = len,
        namespace_aware,
        lc_levels = builder.location_cache().levels(),
        "parsing document"
    );

    let sniffed = sniff(&doc, offset, end, namespace_aware)?;
    tracing::debug!(encoding = %sniffed.encoding, bom = ?sniffed.bom, "detected encoding");

    resolver.reset();
    let outcome = Lexer::new(
        &doc,
        sniffed,
        offset,
        end,
        namespace_aware,
        config.record_whitespace,
        builder,
        resolver,
    )
    .run()
    .inspect_err(|err| tracing::debug!(error = %err, "parse failed"))?;

    let (tokens, lc, root) = builder.take();
    tracing::debug!(tokens = tokens.len(), max_depth = outcome.max_depth, "parse complete");

    Ok(VtdIndex {
        doc,
        doc_offset: offset,
        doc_len: len,
        encoding: outcome.encoding,
        namespace_aware,
        max_depth: outcome.max_depth,
        root,
        tokens,
        lc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LcDepth;
    use crate::index::location::FULL_LEVELS;
    use crate::index::token::{TokenType, MAX_TOKEN_LENGTH};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_boundary_document() {
        let index = VtdGen::new().parse(b"<r/>".to_vec(), false).unwrap();
        let kinds: Vec<_> = index.tokens().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TokenType::Document, TokenType::StartTag]);
        assert_eq!(index.root_index(), Some(1));
        assert_eq!(index.max_depth(), 0);
        assert!(index.location_cache().is_empty());
    }

    #[test]
    fn test_root_after_prolog() {
        let doc = b"<?xml version='1.0'?><!-- c --><!DOCTYPE r><r><a/></r>";
        let index = VtdGen::new().parse(doc.to_vec(), false).unwrap();
        let root = index.root_index().unwrap() as usize;
        assert_eq!(index.token(root).kind, TokenType::StartTag);
        assert_eq!(index.token(root).depth, 0);
        assert_eq!(index.raw_string(root).unwrap(), "r");
        assert_eq!(index.max_depth(), 1);
    }

    #[test]
    fn test_long_text_is_split() {
        let mut doc = b"<r>".to_vec();
        doc.extend(std::iter::repeat(b'a').take(2_000_000));
        doc.extend_from_slice(b"</r>");
        let index = VtdGen::new().parse(doc, false).unwrap();
        let text: Vec<_> = index
            .tokens()
            .filter(|t| t.kind == TokenType::CharacterData)
            .map(|t| (t.offset, t.len(), t.depth))
            .collect();
        assert_eq!(
            text,
            vec![
                (3, MAX_TOKEN_LENGTH, 0),
                (3 + MAX_TOKEN_LENGTH, 2_000_000 - MAX_TOKEN_LENGTH, 0),
            ]
        );
        assert_eq!(index.location_cache().levels(), FULL_LEVELS);
    }

    fn repeated(head: &[u8], fill: u8, count: usize, tail: &[u8]) -> Vec<u8> {
        let mut doc = head.to_vec();
        doc.extend(std::iter::repeat(fill).take(count));
        doc.extend_from_slice(tail);
        doc
    }

    fn length_error(doc: Vec<u8>) -> String {
        let err = VtdGen::new().parse(doc, false).unwrap_err();
        assert_eq!(err.kind(), "syntax");
        err.message().to_string()
    }

    #[test]
    fn test_name_length_limits() {
        let mut gen = VtdGen::new();
        assert!(gen.parse(repeated(b"<", b'a', 2047, b"/>"), false).is_ok());
        assert_eq!(
            length_error(repeated(b"<", b'a', 2048, b"/>")),
            "name prefix or qualified name too long"
        );

        assert!(gen.parse(repeated(b"<", b'p', 511, b":b/>"), false).is_ok());
        assert_eq!(
            length_error(repeated(b"<", b'p', 512, b":b/>")),
            "name prefix or qualified name too long"
        );

        assert!(gen.parse(repeated(b"<r ", b'a', 2047, b"='1'/>"), false).is_ok());
        assert_eq!(
            length_error(repeated(b"<r ", b'a', 2048, b"='1'/>")),
            "name prefix or qualified name too long"
        );
    }

    #[test]
    fn test_long_values_are_rejected() {
        let max = MAX_TOKEN_LENGTH as usize;
        let mut gen = VtdGen::new();

        assert!(gen.parse(repeated(b"<r a='", b'v', max, b"'/>"), false).is_ok());
        assert_eq!(length_error(repeated(b"<r a='", b'v', max + 1, b"'/>")), "attr_val too long");

        assert!(gen.parse(repeated(b"<?pi ", b'v', max, b"?><r/>"), false).is_ok());
        assert_eq!(length_error(repeated(b"<?pi ", b'v', max + 1, b"?><r/>")), "pi_val too long");

        // the DOCTYPE value starts at the space after the keyword
        assert!(gen.parse(repeated(b"<!DOCTYPE ", b'r', max - 1, b"><r/>"), false).is_ok());
        assert_eq!(length_error(repeated(b"<!DOCTYPE ", b'r', max, b"><r/>")), "dtd_val too long");
    }

    #[test]
    fn test_long_comment_and_cdata_are_split() {
        let max = MAX_TOKEN_LENGTH as usize;
        let split = |doc: Vec<u8>, kind: TokenType| -> Vec<(u32, u32, i32)> {
            let index = VtdGen::new().parse(doc, false).unwrap();
            index
                .tokens()
                .filter(|t| t.kind == kind)
                .map(|t| (t.offset, t.len(), t.depth))
                .collect()
        };

        let comment = split(repeated(b"<r><!--", b'c', max + 5, b"--></r>"), TokenType::Comment);
        assert_eq!(comment, vec![(7, MAX_TOKEN_LENGTH, 0), (7 + MAX_TOKEN_LENGTH, 5, 0)]);

        let cdata = split(repeated(b"<r><![CDATA[", b'd', max + 1, b"]]></r>"), TokenType::Cdata);
        assert_eq!(cdata, vec![(12, MAX_TOKEN_LENGTH, 0), (12 + MAX_TOKEN_LENGTH, 1, 0)]);
    }

    #[test]
    fn test_stray_nul_is_an_encoding_error() {
        let err = VtdGen::new().parse(vec![0x00, 0x41, 0x00, 0x42], false).unwrap_err();
        assert!(matches!(err, ParseError::Encoding { .. }));
        let err = VtdGen::new().parse(vec![0x3C, 0x00, 0x72, 0x00], false).unwrap_err();
        assert!(matches!(err, ParseError::Encoding { .. }));
    }

    #[test]
    fn test_bom_contradiction() {
        let mut doc = vec![0xEF, 0xBB, 0xBF];
        doc.extend_from_slice(b"<?xml version='1.0' encoding='UTF-16'?><r/>");
        let err = VtdGen::new().parse(doc, false).unwrap_err();
        assert!(matches!(err, ParseError::Encoding { .. }));
    }

    #[test]
    fn test_reserved_uri_rejected() {
        let doc = b"<r xmlns:p='http://www.w3.org/2000/xmlns/'/>";
        let err = VtdGen::new().parse(doc.to_vec(), true).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
        assert!(VtdGen::new().parse(doc.to_vec(), false).is_ok());
    }

    #[test]
    fn test_unqualified_element() {
        let err = VtdGen::new().parse(b"<r><p:a/></r>".to_vec(), true).unwrap_err();
        assert_eq!(err.message(), "element not qualified");
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (1, 5));
    }

    #[test]
    fn test_error_position_on_later_line() {
        let err = VtdGen::new().parse(b"<r>\n  <a></b>\n</r>".to_vec(), false).unwrap_err();
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (2, 8));
    }

    #[test]
    fn test_invalid_range() {
        let mut gen = VtdGen::new();
        assert!(gen.parse_range(b"<r/>".to_vec(), 2, 4, false).is_err());
        assert!(gen.parse_range(b"<r/>".to_vec(), usize::MAX, 2, false).is_err());
        assert!(gen.parse_range(b"<r/>".to_vec(), 0, 0, false).is_err());
    }

    #[test]
    fn test_range_keeps_absolute_offsets() {
        let index = VtdGen::new()
            .parse_range(b"junk<r>x</r>junk".to_vec(), 4, 8, false)
            .unwrap();
        assert_eq!(index.token(1).offset, 5);
        assert_eq!(index.token(2).offset, 7);
    }

    #[test]
    fn test_parse_reusing_and_recycle() {
        let mut gen = VtdGen::new();
        let first = gen.parse_reusing(b"<r><a/><b/></r>".to_vec(), 0, 15, false).unwrap();
        let expected: Vec<_> = first.tokens().collect();
        let doc = gen.recycle(first);
        let second = gen.parse_reusing(doc, 0, 15, false).unwrap();
        assert_eq!(second.tokens().collect::<Vec<_>>(), expected);

        // a failed parse leaves the arena usable
        assert!(gen.parse_reusing(b"<r>".to_vec(), 0, 3, false).is_err());
        let third = gen.parse_reusing(b"<r/>".to_vec(), 0, 4, false).unwrap();
        assert_eq!(third.token_count(), 2);
    }

    #[test]
    fn test_lc_depth_config() {
        let doc = b"<r><a><b><c/></b></a></r>".to_vec();
        let shallow = VtdGen::new().parse(doc.clone(), false).unwrap();
        assert_eq!(shallow.location_cache().levels(), SHALLOW_LEVELS);
        let full = VtdGen::with_config(ParserConfig::default().with_lc_depth(LcDepth::Full))
            .parse(doc, false)
            .unwrap();
        assert_eq!(full.location_cache().levels(), FULL_LEVELS);
        assert_eq!(full.location_cache().entries(3).len(), 1);
    }

    // ========================================================================
    // Properties
    // ========================================================================

    #[derive(Debug, Clone)]
    struct Node {
        name: String,
        text: Option<String>,
        children: Vec<Node>,
    }

    fn node() -> impl Strategy<Value = Node> {
        let leaf = ("[a-z][a-z0-9]{0,6}", proptest::option::of("[a-z ]{1,8}")).prop_map(|(name, text)| Node {
            name,
            text,
            children: Vec::new(),
        });
        leaf.prop_recursive(5, 48, 4, |inner| {
            ("[a-z][a-z0-9]{0,6}", prop::collection::vec(inner, 0..4)).prop_map(|(name, children)| Node {
                name,
                text: None,
                children,
            })
        })
    }

    fn serialize(node: &Node, out: &mut String) {
        match (&node.text, node.children.is_empty()) {
            (None, true) => {
                out.push_str(&format!("<{}/>", node.name));
            }
            (Some(text), _) => {
                out.push_str(&format!("<{}>{}</{}>", node.name, text, node.name));
            }
            (None, false) => {
                out.push_str(&format!("<{}>", node.name));
                for child in &node.children {
                    serialize(child, out);
                }
                out.push_str(&format!("</{}>", node.name));
            }
        }
    }

    fn expected(node: &Node, depth: i32, out: &mut Vec<(TokenType, i32, u32)>) {
        out.push((TokenType::StartTag, depth, node.name.len() as u32));
        if let Some(text) = &node.text {
            out.push((TokenType::CharacterData, depth, text.len() as u32));
        }
        for child in &node.children {
            expected(child, depth + 1, out);
        }
    }

    proptest! {
        #[test]
        fn prop_nesting_is_indexed(root in node()) {
            let mut doc = String::new();
            serialize(&root, &mut doc);
            let index = VtdGen::new().parse(doc.into_bytes(), false).unwrap();

            let mut want = Vec::new();
            expected(&root, 0, &mut want);
            let got: Vec<_> = index.tokens().skip(1).map(|t| (t.kind, t.depth, t.len())).collect();
            prop_assert_eq!(got, want);

            let count_at = |d: i32| index.tokens().filter(|t| t.kind == TokenType::StartTag && t.depth == d).count();
            prop_assert_eq!(index.location_cache().entries(1).len(), count_at(1));
            prop_assert_eq!(index.location_cache().entries(2).len(), count_at(2));
            prop_assert_eq!(index.location_cache().leaves().len(), count_at(3));
        }

        #[test]
        fn prop_two_generators_agree(root in node(), ns in any::<bool>()) {
            let mut doc = String::new();
            serialize(&root, &mut doc);
            let a = VtdGen::new().parse(doc.clone().into_bytes(), ns).unwrap();
            let b = VtdGen::new().parse(doc.into_bytes(), ns).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}

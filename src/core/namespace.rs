//! Namespace Resolution
//!
//! Scope-stack resolver used when parsing in namespace-aware mode. It never
//! copies names: declarations, prefixes and URIs are byte ranges of the
//! document, compared in place.
//!
//! - `xmlns:p="..."` declarations accumulate in one list; `scopes[d]` holds
//!   how many of them were in scope when the start tag at depth `d` closed.
//! - An element's own prefix and its prefixed attributes are qualified when
//!   its start tag closes, after its declarations are known.

use crate::core::entities::{resolved_eq, resolved_matches};
use crate::core::reader::CharReader;
use crate::error::{ParseError, Result};

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
}

/// Which reserved namespace a URI names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedUri {
    None,
    Xml,
    Xmlns,
}

/// Classify a declared URI after reference resolution
pub fn reserved_uri(reader: &CharReader<'_>, offset: usize, len: usize) -> Result<ReservedUri> {
    if resolved_matches(reader, offset, len, ns::XML)? {
        Ok(ReservedUri::Xml)
    } else if resolved_matches(reader, offset, len, ns::XMLNS)? {
        Ok(ReservedUri::Xmlns)
    } else {
        Ok(ReservedUri::None)
    }
}

/// Byte range of a prefixed name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixedName {
    /// Start of the name (and of its prefix)
    pub offset: usize,
    pub prefix_len: usize,
    /// Start of the local part, after the colon
    pub local_offset: usize,
    pub local_len: usize,
}

#[derive(Debug, Clone, Copy)]
struct NsDecl {
    prefix_offset: usize,
    prefix_len: usize,
    uri_offset: usize,
    uri_len: usize,
}

/// A prefixed attribute and the declaration its prefix resolved to
#[derive(Debug, Clone, Copy)]
struct PrefixedAttr {
    name: PrefixedName,
    decl: usize,
}

#[derive(Debug, Default)]
pub struct NamespaceResolver {
    decls: Vec<NsDecl>,
    scopes: Vec<usize>,
    /// Prefix of an `xmlns:p` attribute whose value is being read
    pending_prefix: Option<(usize, usize)>,
    attrs: Vec<PrefixedAttr>,
    element: Option<PrefixedName>,
}

impl NamespaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.decls.clear();
        self.scopes.clear();
        self.pending_prefix = None;
        self.attrs.clear();
        self.element = None;
    }

    /// A start tag at `depth` begins: drop the scopes of closed siblings and
    /// their descendants.
    pub fn enter_element(&mut self, depth: usize, prefixed: Option<PrefixedName>) {
        if self.scopes.len() > depth {
            self.scopes.truncate(depth);
            let keep = self.scopes.last().copied().unwrap_or(0);
            self.decls.truncate(keep);
        }
        self.element = prefixed;
        self.attrs.clear();
        self.pending_prefix = None;
    }

    /// Remember the prefix of an `xmlns:p` attribute until its value is read
    pub fn declare_prefix(&mut self, prefix_offset: usize, prefix_len: usize) {
        self.pending_prefix = Some((prefix_offset, prefix_len));
    }

    /// Bind the pending prefix to the URI just read
    pub fn bind_uri(&mut self, uri_offset: usize, uri_len: usize) {
        if let Some((prefix_offset, prefix_len)) = self.pending_prefix.take() {
            self.decls.push(NsDecl {
                prefix_offset,
                prefix_len,
                uri_offset,
                uri_len,
            });
        }
    }

    pub fn add_prefixed_attr(&mut self, name: PrefixedName) {
        self.attrs.push(PrefixedAttr { name, decl: 0 });
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Close the current start tag: open its scope and qualify the element
    /// and its prefixed attributes.
    pub fn close_start_tag(&mut self, reader: &CharReader<'_>) -> Result<()> {
        self.scopes.push(self.decls.len());

        let mut attrs = std::mem::take(&mut self.attrs);
        for attr in &mut attrs {
            attr.decl = self
                .lookup(reader, attr.name.offset, attr.name.prefix_len)
                .ok_or_else(|| ParseError::syntax_at("prefixed attribute not qualified", attr.name.offset))?;
        }
        if attrs.len() > 1 {
            self.check_qualified_uniqueness(reader, &attrs)?;
        }
        attrs.clear();
        self.attrs = attrs;

        if let Some(element) = self.element.take() {
            let is_xml = reader.range_eq_str(element.offset, element.prefix_len, "xml")?;
            if !is_xml && self.lookup(reader, element.offset, element.prefix_len).is_none() {
                return Err(ParseError::syntax_at("element not qualified", element.offset));
            }
        }
        Ok(())
    }

    /// Most recent in-scope declaration of a prefix
    fn lookup(&self, reader: &CharReader<'_>, offset: usize, len: usize) -> Option<usize> {
        let prefix = reader.bytes(offset, len);
        self.decls
            .iter()
            .rposition(|d| reader.bytes(d.prefix_offset, d.prefix_len) == prefix)
    }

    /// Two prefixed attributes with the same local name must not resolve to
    /// the same URI
    fn check_qualified_uniqueness(&self, reader: &CharReader<'_>, attrs: &[PrefixedAttr]) -> Result<()> {
        for (i, a) in attrs.iter().enumerate() {
            let a_local = reader.bytes(a.name.local_offset, a.name.local_len);
            for b in &attrs[i + 1..] {
                if reader.bytes(b.name.local_offset, b.name.local_len) != a_local {
                    continue;
                }
                let (da, db) = (self.decls[a.decl], self.decls[b.decl]);
                if resolved_eq(reader, da.uri_offset, da.uri_len, db.uri_offset, db.uri_len)? {
                    return Err(ParseError::syntax_at("qualified attribute names collide", b.name.offset));
                }
            }
        }
        Ok(())
    }
}

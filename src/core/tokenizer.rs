//! XML Lexer - State machine that writes the token index
//!
//! A single forward pass over the document. Every state reads characters
//! through the `CharReader`, writes tokens straight into the `IndexBuilder`
//! and returns the next state. Nothing is allocated per token:
//! - Names and values are recorded as (offset, length) in character units
//! - Start tags are matched against end tags by byte comparison
//! - Namespace checks run on byte ranges through the `NamespaceResolver`
//!
//! The XML declaration is lexed by `declaration.rs`, comments, CDATA,
//! processing instructions and DOCTYPE by `markup.rs`.

use crate::core::chars::{is_content_char, is_name_char, is_name_start_char, is_space_char, is_valid_char};
use crate::core::encoding::{Bom, Encoding, Sniffed};
use crate::core::entities::entity_identifier;
use crate::core::namespace::{reserved_uri, NamespaceResolver, PrefixedName, ReservedUri};
use crate::core::reader::CharReader;
use crate::error::{ParseError, Result};
use crate::index::builder::IndexBuilder;
use crate::index::token::{TokenType, MAX_DEPTH, MAX_PREFIX_LENGTH, MAX_QNAME_LENGTH, MAX_TOKEN_LENGTH};

pub(crate) const LT: u32 = '<' as u32;
pub(crate) const GT: u32 = '>' as u32;
pub(crate) const SLASH: u32 = '/' as u32;
pub(crate) const QM: u32 = '?' as u32;
pub(crate) const BANG: u32 = '!' as u32;
pub(crate) const EQ: u32 = '=' as u32;
pub(crate) const AMP: u32 = '&' as u32;
pub(crate) const COLON: u32 = ':' as u32;
pub(crate) const DASH: u32 = '-' as u32;
pub(crate) const RSQB: u32 = ']' as u32;
pub(crate) const LSQB: u32 = '[' as u32;
pub(crate) const DQUOTE: u32 = '"' as u32;
pub(crate) const SQUOTE: u32 = '\'' as u32;

/// Lexer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    DocStart,
    /// Inside `<?xml ... ?>`
    DecAttrName,
    /// Just read `<`
    LtSeen,
    StartTag,
    AttrName,
    AttrVal,
    Text,
    EndTag,
    PiTag,
    PiVal,
    Comment,
    Cdata,
    Doctype,
    /// Root element closed
    DocEnd,
    EndComment,
    EndPi,
}

/// Scratch values carried between states
#[derive(Debug)]
pub(crate) struct Cursor {
    /// Element depth, -1 outside the root
    pub depth: i32,
    pub max_depth: i32,
    /// Start of the token being scanned
    pub temp_offset: usize,
    /// Bytes before the colon of the name being scanned, 0 if unprefixed
    pub prefix_len: usize,
    /// Character handed from one state to the next
    pub ch: u32,
    pub quote: u32,
    /// Attribute is a namespace declaration
    pub is_ns: bool,
    /// Attribute is `xmlns` itself
    pub default_ns: bool,
    /// Attribute declares the `xml` prefix
    pub is_xml: bool,
    /// The start tag just closed was not self-closing
    pub has_content: bool,
    pub has_dtd: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            depth: -1,
            max_depth: 0,
            temp_offset: 0,
            prefix_len: 0,
            ch: 0,
            quote: 0,
            is_ns: false,
            default_ns: false,
            is_xml: false,
            has_content: false,
            has_dtd: false,
        }
    }
}

/// What a finished lex reports back
#[derive(Debug, Clone, Copy)]
pub(crate) struct LexOutcome {
    pub encoding: Encoding,
    pub max_depth: u8,
}

pub(crate) struct Lexer<'a, 'b> {
    pub(super) r: CharReader<'a>,
    pub(super) out: &'b mut IndexBuilder,
    pub(super) ns: &'b mut NamespaceResolver,
    pub(super) namespace_aware: bool,
    record_whitespace: bool,
    pub(super) bom: Bom,
    /// (offset, byte length) of the open start tag at each depth
    tag_stack: Vec<(usize, usize)>,
    /// Raw attribute names of the current start tag
    attr_names: Vec<(usize, usize)>,
}

impl<'a, 'b> Lexer<'a, 'b> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        doc: &'a [u8],
        sniffed: Sniffed,
        start: usize,
        end: usize,
        namespace_aware: bool,
        record_whitespace: bool,
        out: &'b mut IndexBuilder,
        ns: &'b mut NamespaceResolver,
    ) -> Self {
        Lexer {
            r: CharReader::new(doc, start + sniffed.consumed, end, sniffed.encoding),
            out,
            ns,
            namespace_aware,
            record_whitespace,
            bom: sniffed.bom,
            tag_stack: vec![(0, 0); MAX_DEPTH as usize + 1],
            attr_names: Vec::with_capacity(8),
        }
    }

    /// Lex the whole document.
    ///
    /// End of input is only a normal outcome once the root element has
    /// closed; everywhere else it is reported as `ParseError::Eof`. Errors
    /// carry the 1-based line and column where lexing stopped.
    pub fn run(mut self) -> Result<LexOutcome> {
        let mut cur = Cursor::default();
        self.out.write(TokenType::Document, 0, 0, -1);
        let mut state = State::DocStart;
        loop {
            match self.step(state, &mut cur) {
                Ok(next) => state = next,
                Err(ParseError::Eof) if state == State::DocEnd => break,
                Err(err) => return Err(self.locate(err)),
            }
        }
        self.out.finish();
        Ok(LexOutcome {
            encoding: self.r.encoding(),
            max_depth: cur.max_depth.clamp(0, MAX_DEPTH) as u8,
        })
    }

    fn locate(&self, err: ParseError) -> ParseError {
        if err.is_eof() {
            return err;
        }
        let offset = err.explicit_offset().unwrap_or_else(|| self.r.prev());
        let position = self.r.position_of(offset);
        err.with_position(position)
    }

    fn step(&mut self, state: State, cur: &mut Cursor) -> Result<State> {
        match state {
            State::DocStart => self.doc_start(cur),
            State::DecAttrName => self.declaration(cur),
            State::LtSeen => self.lt_seen(cur),
            State::StartTag => self.start_tag(cur),
            State::AttrName => self.attr_name(cur),
            State::AttrVal => self.attr_val(cur),
            State::Text => self.text(cur),
            State::EndTag => self.end_tag(cur),
            State::PiTag => self.pi_tag(cur),
            State::PiVal => self.pi_val(cur),
            State::Comment => self.comment(cur),
            State::Cdata => self.cdata(cur),
            State::Doctype => self.doctype(cur),
            State::DocEnd => self.doc_end(cur),
            State::EndComment => self.end_comment(cur),
            State::EndPi => self.end_pi(cur),
        }
    }

    // ========================================================================
    // Token output
    // ========================================================================

    /// Byte count to character units
    #[inline]
    pub(super) fn units(&self, bytes: usize) -> u32 {
        (bytes >> self.r.encoding().unit_shift()) as u32
    }

    #[inline]
    pub(super) fn inc(&self) -> usize {
        self.r.encoding().increment()
    }

    #[inline]
    pub(super) fn emit(&mut self, kind: TokenType, offset: usize, len: usize, depth: i32) {
        let (offset, len) = (self.units(offset), self.units(len));
        self.out.write(kind, offset, len, depth);
    }

    /// Emit a token whose length may not exceed the length field
    pub(super) fn emit_bounded(&mut self, kind: TokenType, offset: usize, len: usize, depth: i32) -> Result<()> {
        if self.units(len) > MAX_TOKEN_LENGTH {
            return Err(ParseError::syntax_at(format!("{} too long", kind.as_str()), offset));
        }
        self.emit(kind, offset, len, depth);
        Ok(())
    }

    /// Text-like tokens are split rather than rejected
    #[inline]
    pub(super) fn emit_text(&mut self, kind: TokenType, offset: usize, len: usize, depth: i32) {
        let (offset, len) = (self.units(offset), self.units(len));
        self.out.write_text(kind, offset, len, depth);
    }

    fn check_name_length(&self, offset: usize, prefix_len: usize, len: usize) -> Result<()> {
        if self.units(prefix_len) > MAX_PREFIX_LENGTH || self.units(len) > MAX_QNAME_LENGTH {
            return Err(ParseError::syntax_at("name prefix or qualified name too long", offset));
        }
        Ok(())
    }

    /// Element and attribute names carry their prefix length
    fn emit_name(&mut self, kind: TokenType, offset: usize, prefix_len: usize, len: usize, depth: i32) -> Result<()> {
        self.check_name_length(offset, prefix_len, len)?;
        let length = crate::index::token::qualified_length(self.units(prefix_len), self.units(len));
        let offset = self.units(offset);
        if kind == TokenType::StartTag {
            self.out.write_element(offset, length, depth);
        } else {
            self.out.write(kind, offset, length, depth);
        }
        Ok(())
    }

    /// Whitespace-only run between markup, `temp_offset` up to `end`
    fn whitespace_record(&mut self, cur: &Cursor, end: usize) {
        if self.record_whitespace && cur.depth > -1 && end > cur.temp_offset {
            self.emit_text(TokenType::CharacterData, cur.temp_offset, end - cur.temp_offset, cur.depth);
        }
    }

    // ========================================================================
    // Prolog
    // ========================================================================

    fn doc_start(&mut self, cur: &mut Cursor) -> Result<State> {
        let c = self.r.get_char()?;
        if c == LT {
            cur.temp_offset = self.r.offset();
            if self.r.skip_char(QM)?
                && self.r.skip_either(b'x', b'X')?
                && self.r.skip_either(b'm', b'M')?
                && self.r.skip_either(b'l', b'L')?
            {
                let c = self.r.get_char()?;
                if is_space_char(c) {
                    cur.ch = self.r.get_char_after_space()?;
                    return Ok(State::DecAttrName);
                }
                if c == QM {
                    return Err(ParseError::syntax("premature end of XML declaration"));
                }
            }
            self.r.set_offset(cur.temp_offset);
            return Ok(State::LtSeen);
        }
        if is_space_char(c) && self.r.get_char_after_space()? == LT {
            return Ok(State::LtSeen);
        }
        Err(ParseError::syntax("XML not starting properly"))
    }

    fn lt_seen(&mut self, cur: &mut Cursor) -> Result<State> {
        cur.temp_offset = self.r.offset();
        let c = self.r.get_char()?;
        if is_name_start_char(c) {
            cur.depth += 1;
            return Ok(State::StartTag);
        }
        match c {
            SLASH => {
                cur.temp_offset = self.r.offset();
                Ok(State::EndTag)
            }
            QM => {
                cur.temp_offset = self.r.offset();
                Ok(State::PiTag)
            }
            BANG => self.markup_decl(cur),
            _ => Err(ParseError::syntax("invalid char after <")),
        }
    }

    // ========================================================================
    // Elements
    // ========================================================================

    fn start_tag(&mut self, cur: &mut Cursor) -> Result<State> {
        let mut c;
        loop {
            c = self.r.get_char()?;
            if !is_name_char(c) {
                break;
            }
            if c == COLON {
                cur.prefix_len = self.r.prev() - cur.temp_offset;
            }
        }
        let start = cur.temp_offset;
        let len = self.r.prev() - start;

        if self.namespace_aware && cur.prefix_len != 0 && self.r.range_eq_str(start, cur.prefix_len, "xmlns")? {
            return Err(ParseError::syntax_at("xmlns can't be an element prefix", start));
        }
        if cur.depth > MAX_DEPTH {
            return Err(ParseError::syntax_at("element depth exceeds the maximum of 254", start));
        }
        let depth = cur.depth as usize;
        self.tag_stack[depth] = (start, len);
        cur.max_depth = cur.max_depth.max(cur.depth);

        self.emit_name(TokenType::StartTag, start, cur.prefix_len, len, cur.depth)?;
        if self.namespace_aware {
            let inc = self.inc();
            let prefixed = (cur.prefix_len != 0).then(|| PrefixedName {
                offset: start,
                prefix_len: cur.prefix_len,
                local_offset: start + cur.prefix_len + inc,
                local_len: len.saturating_sub(cur.prefix_len + inc),
            });
            self.ns.enter_element(depth, prefixed);
        }
        self.attr_names.clear();
        cur.prefix_len = 0;
        cur.has_content = true;

        if is_space_char(c) {
            c = self.r.get_char_after_space()?;
            if is_name_start_char(c) {
                cur.temp_offset = self.r.prev();
                cur.ch = c;
                return Ok(State::AttrName);
            }
        }
        self.tag_tail(cur, c)
    }

    /// `/>` or `>` closing a start tag
    fn tag_tail(&mut self, cur: &mut Cursor, mut c: u32) -> Result<State> {
        if c == SLASH {
            cur.depth -= 1;
            cur.has_content = false;
            c = self.r.get_char()?;
        }
        if c != GT {
            return Err(ParseError::syntax("invalid char in start tag"));
        }
        if self.namespace_aware {
            self.ns.close_start_tag(&self.r)?;
        }
        if cur.depth == -1 {
            return Ok(State::DocEnd);
        }

        cur.temp_offset = self.r.offset();
        let c = self.r.get_char_after_space()?;
        if c != LT {
            return self.text_start(c);
        }
        let lt = self.r.prev();
        if self.r.skip_char(SLASH)? {
            if cur.has_content {
                // `<a></a>` and `<a> </a>` still get a text token
                self.emit_text(TokenType::CharacterData, cur.temp_offset, lt - cur.temp_offset, cur.depth);
            } else {
                self.whitespace_record(cur, lt);
            }
            cur.temp_offset = self.r.offset();
            return Ok(State::EndTag);
        }
        self.whitespace_record(cur, lt);
        Ok(State::LtSeen)
    }

    fn end_tag(&mut self, cur: &mut Cursor) -> Result<State> {
        if cur.depth < 0 {
            return Err(ParseError::syntax_at("end tag without a start tag", cur.temp_offset));
        }
        let (start, len) = self.tag_stack[cur.depth as usize];
        let name_end = cur.temp_offset + len;
        if name_end >= self.r.end() {
            return Err(ParseError::Eof);
        }
        if self.r.bytes(cur.temp_offset, len) != self.r.bytes(start, len) {
            return Err(ParseError::syntax_at("start/end tag mismatch", cur.temp_offset));
        }
        self.r.set_offset(name_end);
        cur.depth -= 1;
        if self.r.get_char_after_space()? != GT {
            return Err(ParseError::syntax("invalid char in end tag"));
        }
        if cur.depth == -1 {
            return Ok(State::DocEnd);
        }
        self.after_markup(cur)
    }

    /// Between markup inside the root: whitespace, then either `<` or text
    pub(super) fn after_markup(&mut self, cur: &mut Cursor) -> Result<State> {
        cur.temp_offset = self.r.offset();
        let c = self.r.get_char_after_space()?;
        if c == LT {
            let lt = self.r.prev();
            self.whitespace_record(cur, lt);
            return Ok(State::LtSeen);
        }
        self.text_start(c)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    fn attr_name(&mut self, cur: &mut Cursor) -> Result<State> {
        let mut c = cur.ch;
        cur.is_ns = false;
        cur.default_ns = false;
        cur.is_xml = false;
        if c == 'x' as u32 && self.r.skip_str("mlns")? {
            c = self.r.get_char()?;
            if c == EQ || is_space_char(c) {
                cur.is_ns = true;
                cur.default_ns = true;
            } else if c == COLON {
                cur.is_ns = true;
            }
        }
        while is_name_char(c) {
            if c == COLON {
                cur.prefix_len = self.r.prev() - cur.temp_offset;
            }
            c = self.r.get_char()?;
        }
        let start = cur.temp_offset;
        let len = self.r.prev() - start;
        let inc = self.inc();

        if cur.is_ns && !cur.default_ns && self.namespace_aware {
            let local = start + cur.prefix_len + inc;
            let local_len = len.saturating_sub(cur.prefix_len + inc);
            if self.r.range_eq_str(local, local_len, "xmlns")? {
                return Err(ParseError::syntax_at("xmlns prefix can't be re-declared", start));
            }
            cur.is_xml = self.r.range_eq_str(local, local_len, "xml")?;
        }

        let name = self.r.bytes(start, len);
        if self.attr_names.iter().any(|&(o, l)| self.r.bytes(o, l) == name) {
            return Err(ParseError::syntax_at("attribute name not unique", start));
        }
        self.attr_names.push((start, len));

        let kind = if cur.is_ns {
            TokenType::AttrNs
        } else {
            TokenType::AttrName
        };
        self.emit_name(kind, start, cur.prefix_len, len, cur.depth)?;

        if self.namespace_aware && cur.prefix_len != 0 {
            let local_offset = start + cur.prefix_len + inc;
            let local_len = len.saturating_sub(cur.prefix_len + inc);
            if cur.is_ns {
                if !cur.is_xml {
                    self.ns.declare_prefix(local_offset, local_len);
                }
            } else if !self.r.range_eq_str(start, cur.prefix_len, "xml")? {
                self.ns.add_prefixed_attr(PrefixedName {
                    offset: start,
                    prefix_len: cur.prefix_len,
                    local_offset,
                    local_len,
                });
            }
        }
        cur.prefix_len = 0;

        if is_space_char(c) {
            c = self.r.get_char_after_space()?;
        }
        if c != EQ {
            return Err(ParseError::syntax("'=' expected after attribute name"));
        }
        c = self.r.get_char_after_space()?;
        if c != DQUOTE && c != SQUOTE {
            return Err(ParseError::syntax("attribute value must be quoted"));
        }
        cur.quote = c;
        cur.temp_offset = self.r.offset();
        Ok(State::AttrVal)
    }

    fn attr_val(&mut self, cur: &mut Cursor) -> Result<State> {
        loop {
            let c = self.r.get_char()?;
            if c == cur.quote {
                break;
            }
            if !is_valid_char(c) || c == LT {
                return Err(ParseError::syntax("invalid char in attribute value"));
            }
            if c == AMP {
                entity_identifier(&mut self.r)?;
            }
        }
        let start = cur.temp_offset;
        let len = self.r.prev() - start;

        if self.namespace_aware && cur.is_ns {
            self.check_ns_uri(cur, start, len)?;
        }
        self.emit_bounded(TokenType::AttrVal, start, len, cur.depth)?;
        cur.is_ns = false;
        cur.is_xml = false;

        let mut c = self.r.get_char()?;
        if is_space_char(c) {
            c = self.r.get_char_after_space()?;
            if is_name_start_char(c) {
                cur.temp_offset = self.r.prev();
                cur.ch = c;
                return Ok(State::AttrName);
            }
        }
        self.tag_tail(cur, c)
    }

    /// Value of a namespace declaration
    fn check_ns_uri(&mut self, cur: &Cursor, start: usize, len: usize) -> Result<()> {
        if !cur.default_ns && len == 0 {
            return Err(ParseError::syntax_at("prefixed namespace URI can't be empty", start));
        }
        let reserved = reserved_uri(&self.r, start, len)?;
        if cur.is_xml {
            if reserved != ReservedUri::Xml {
                return Err(ParseError::syntax_at("xml prefix can only be bound to its reserved URI", start));
            }
            return Ok(());
        }
        if !cur.default_ns {
            self.ns.bind_uri(start, len);
        }
        match reserved {
            ReservedUri::None => Ok(()),
            ReservedUri::Xml => Err(ParseError::syntax_at("reserved xml namespace URI can't be declared", start)),
            ReservedUri::Xmlns => Err(ParseError::syntax_at("reserved xmlns namespace URI can't be declared", start)),
        }
    }

    // ========================================================================
    // Character data
    // ========================================================================

    /// First non-space char of a text run has been read
    fn text_start(&mut self, c: u32) -> Result<State> {
        if !is_content_char(c) {
            self.other_text_char(c)?;
        }
        Ok(State::Text)
    }

    fn text(&mut self, cur: &mut Cursor) -> Result<State> {
        if cur.depth == -1 {
            return Err(ParseError::syntax_at("character data outside the root element", cur.temp_offset));
        }
        loop {
            let c = self.r.get_char()?;
            if c == LT {
                break;
            }
            if !is_content_char(c) {
                self.other_text_char(c)?;
            }
        }
        let len = self.r.prev() - cur.temp_offset;
        self.emit_text(TokenType::CharacterData, cur.temp_offset, len, cur.depth);
        Ok(State::LtSeen)
    }

    /// Characters in text that need a closer look
    fn other_text_char(&mut self, c: u32) -> Result<()> {
        match c {
            AMP => {
                entity_identifier(&mut self.r)?;
                Ok(())
            }
            RSQB => {
                if self.r.skip_char(RSQB)? {
                    while self.r.skip_char(RSQB)? {}
                    if self.r.skip_char(GT)? {
                        return Err(ParseError::syntax("]]> in character data"));
                    }
                }
                Ok(())
            }
            _ => Err(ParseError::syntax("invalid char in text content")),
        }
    }
}

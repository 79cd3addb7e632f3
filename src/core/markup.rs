//! Markup Declarations
//!
//! Lexer states for everything that starts with `<!` or `<?` (other than
//! the XML declaration), and for the tail of the document after the root
//! element closes, where only comments, PIs and whitespace may follow.

use crate::core::chars::{is_name_char, is_name_start_char, is_space_char, is_valid_char};
use crate::error::{ParseError, Result};
use crate::index::token::TokenType;

use super::tokenizer::{Cursor, Lexer, State, BANG, DASH, GT, LSQB, LT, QM, RSQB};

impl Lexer<'_, '_> {
    /// `<!` has been read
    pub(super) fn markup_decl(&mut self, cur: &mut Cursor) -> Result<State> {
        let c = self.r.get_char()?;
        match c {
            DASH => {
                if !self.r.skip_char(DASH)? {
                    return Err(ParseError::syntax("invalid comment opening"));
                }
                cur.temp_offset = self.r.offset();
                Ok(State::Comment)
            }
            LSQB => {
                if !self.r.skip_str("CDATA[")? {
                    return Err(ParseError::syntax("invalid CDATA opening"));
                }
                if cur.depth == -1 {
                    return Err(ParseError::syntax("CDATA outside the root element"));
                }
                cur.temp_offset = self.r.offset();
                Ok(State::Cdata)
            }
            _ if c == 'D' as u32 => {
                if !self.r.skip_str("OCTYPE")? {
                    return Err(ParseError::syntax("invalid DOCTYPE opening"));
                }
                if cur.depth != -1 {
                    return Err(ParseError::syntax("DOCTYPE declaration in the wrong place"));
                }
                if cur.has_dtd {
                    return Err(ParseError::syntax("only one DOCTYPE declaration is allowed"));
                }
                cur.has_dtd = true;
                cur.temp_offset = self.r.offset();
                Ok(State::Doctype)
            }
            _ => Err(ParseError::syntax("unrecognized char after <!")),
        }
    }

    // ========================================================================
    // Comments and CDATA
    // ========================================================================

    /// Scan to `-->` and write the comment token at `depth`
    fn comment_body(&mut self, cur: &mut Cursor, depth: i32) -> Result<()> {
        loop {
            let c = self.r.get_char()?;
            if !is_valid_char(c) {
                return Err(ParseError::syntax("invalid char in comment"));
            }
            if c == DASH && self.r.skip_char(DASH)? {
                break;
            }
        }
        let len = self.r.offset() - cur.temp_offset - 2 * self.inc();
        if self.r.get_char()? != GT {
            return Err(ParseError::syntax("-- inside a comment"));
        }
        self.emit_text(TokenType::Comment, cur.temp_offset, len, depth);
        Ok(())
    }

    pub(super) fn comment(&mut self, cur: &mut Cursor) -> Result<State> {
        self.comment_body(cur, cur.depth)?;
        if cur.depth == -1 {
            return self.prolog_next();
        }
        self.after_markup(cur)
    }

    pub(super) fn end_comment(&mut self, cur: &mut Cursor) -> Result<State> {
        self.comment_body(cur, -1)?;
        Ok(State::DocEnd)
    }

    pub(super) fn cdata(&mut self, cur: &mut Cursor) -> Result<State> {
        loop {
            let c = self.r.get_char()?;
            if !is_valid_char(c) {
                return Err(ParseError::syntax("invalid char in CDATA"));
            }
            if c == RSQB && self.r.skip_char(RSQB)? {
                while self.r.skip_char(RSQB)? {}
                if self.r.skip_char(GT)? {
                    break;
                }
            }
        }
        let len = self.r.offset() - cur.temp_offset - 3 * self.inc();
        self.emit_text(TokenType::Cdata, cur.temp_offset, len, cur.depth);
        self.after_markup(cur)
    }

    // ========================================================================
    // Processing instructions
    // ========================================================================

    /// Read a PI target, write its token and return the char after it
    fn pi_target(&mut self, cur: &mut Cursor, depth: i32) -> Result<u32> {
        let c = self.r.get_char()?;
        if !is_name_start_char(c) {
            return Err(ParseError::syntax("invalid char in PI target"));
        }
        if (c == 'x' as u32 || c == 'X' as u32) && self.r.skip_either(b'm', b'M')? && self.r.skip_either(b'l', b'L')? {
            let next = self.r.get_char()?;
            if next == QM || is_space_char(next) {
                return Err(ParseError::syntax("[xX][mM][lL] is not a valid PI target"));
            }
            self.r.set_offset(self.r.prev());
        }
        let mut c = c;
        while is_name_char(c) {
            c = self.r.get_char()?;
        }
        let len = self.r.prev() - cur.temp_offset;
        self.emit_bounded(TokenType::PiName, cur.temp_offset, len, depth)?;
        Ok(c)
    }

    /// Scan a PI value up to `?>` and write its token
    fn pi_value(&mut self, cur: &mut Cursor, depth: i32) -> Result<()> {
        loop {
            let c = self.r.get_char()?;
            if !is_valid_char(c) {
                return Err(ParseError::syntax("invalid char in PI value"));
            }
            if c == QM && self.r.skip_char(GT)? {
                break;
            }
        }
        let len = self.r.offset() - cur.temp_offset - 2 * self.inc();
        self.emit_bounded(TokenType::PiVal, cur.temp_offset, len, depth)
    }

    /// After the target: either `?>` with an empty value, or whitespace and
    /// a value. Returns whether a value follows.
    fn pi_after_target(&mut self, cur: &mut Cursor, c: u32, depth: i32) -> Result<bool> {
        if c == QM {
            let at = self.r.prev();
            if !self.r.skip_char(GT)? {
                return Err(ParseError::syntax("invalid PI termination"));
            }
            self.emit(TokenType::PiVal, at, 0, depth);
            return Ok(false);
        }
        if !is_space_char(c) {
            return Err(ParseError::syntax("invalid char after PI target"));
        }
        cur.temp_offset = self.r.offset();
        Ok(true)
    }

    pub(super) fn pi_tag(&mut self, cur: &mut Cursor) -> Result<State> {
        let c = self.pi_target(cur, cur.depth)?;
        if self.pi_after_target(cur, c, cur.depth)? {
            return Ok(State::PiVal);
        }
        if cur.depth == -1 {
            return self.prolog_next();
        }
        self.after_markup(cur)
    }

    pub(super) fn pi_val(&mut self, cur: &mut Cursor) -> Result<State> {
        self.pi_value(cur, cur.depth)?;
        if cur.depth == -1 {
            return self.prolog_next();
        }
        self.after_markup(cur)
    }

    pub(super) fn end_pi(&mut self, cur: &mut Cursor) -> Result<State> {
        let c = self.pi_target(cur, -1)?;
        if self.pi_after_target(cur, c, -1)? {
            self.pi_value(cur, -1)?;
        }
        Ok(State::DocEnd)
    }

    // ========================================================================
    // DOCTYPE and document tail
    // ========================================================================

    /// The DOCTYPE body is kept whole; nested `<...>` are balanced
    pub(super) fn doctype(&mut self, cur: &mut Cursor) -> Result<State> {
        let mut open = 1u32;
        loop {
            let c = self.r.get_char()?;
            if !is_valid_char(c) {
                return Err(ParseError::syntax("invalid char in DOCTYPE"));
            }
            if c == GT {
                open -= 1;
                if open == 0 {
                    break;
                }
            } else if c == LT {
                open += 1;
            }
        }
        let len = self.r.prev() - cur.temp_offset;
        self.emit_bounded(TokenType::DtdVal, cur.temp_offset, len, -1)?;
        self.prolog_next()
    }

    /// Only whitespace may separate prolog markup
    fn prolog_next(&mut self) -> Result<State> {
        if self.r.get_char_after_space()? != LT {
            return Err(ParseError::syntax("character data outside the root element"));
        }
        Ok(State::LtSeen)
    }

    /// Root element closed: comments, PIs and whitespace until the end.
    /// Input ending here is the normal way out of the lexer, except right
    /// after a `<`.
    pub(super) fn doc_end(&mut self, cur: &mut Cursor) -> Result<State> {
        let c = self.r.get_char_after_space()?;
        if c != LT {
            return Err(ParseError::syntax("XML not terminated properly"));
        }
        let next = self.tail_markup(cur).map_err(|err| {
            if err.is_eof() {
                ParseError::syntax("XML not terminated properly")
            } else {
                err
            }
        })?;
        next.ok_or_else(|| ParseError::syntax("XML not terminated properly"))
    }

    fn tail_markup(&mut self, cur: &mut Cursor) -> Result<Option<State>> {
        if self.r.skip_char(QM)? {
            cur.temp_offset = self.r.offset();
            return Ok(Some(State::EndPi));
        }
        if self.r.skip_char(BANG)? && self.r.skip_char(DASH)? && self.r.skip_char(DASH)? {
            cur.temp_offset = self.r.offset();
            return Ok(Some(State::EndComment));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ParserConfig;
    use crate::generator::VtdGen;
    use crate::index::token::{Token, TokenType};

    fn tokens(doc: &[u8]) -> Vec<Token> {
        VtdGen::new().parse(doc.to_vec(), false).unwrap().tokens().collect()
    }

    fn fails(doc: &[u8]) -> bool {
        VtdGen::new().parse(doc.to_vec(), false).is_err()
    }

    #[test]
    fn test_comment_tokens() {
        let t = tokens(b"<!-- a --><r><!--b--></r><!--c-->");
        let comments: Vec<_> = t.iter().filter(|t| t.kind == TokenType::Comment).collect();
        assert_eq!(comments.len(), 3);
        assert_eq!((comments[0].offset, comments[0].len(), comments[0].depth), (4, 3, -1));
        assert_eq!(comments[1].depth, 0);
        assert_eq!(comments[2].depth, -1);
    }

    #[test]
    fn test_bad_comments() {
        assert!(fails(b"<r><!-- a -- b --></r>"));
        assert!(fails(b"<r><!-x--></r>"));
        assert!(fails(b"<r/><!-- open"));
    }

    #[test]
    fn test_cdata() {
        let t = tokens(b"<r><![CDATA[a<b]]]></r>");
        let cdata = t.iter().find(|t| t.kind == TokenType::Cdata).unwrap();
        assert_eq!((cdata.offset, cdata.len()), (12, 4));
        assert!(fails(b"<![CDATA[x]]><r/>"));
    }

    #[test]
    fn test_processing_instructions() {
        let t = tokens(b"<?style a=1?><r><?empty?></r><?tail x?>");
        let pis: Vec<_> = t
            .iter()
            .filter(|t| matches!(t.kind, TokenType::PiName | TokenType::PiVal))
            .map(|t| (t.kind, t.len(), t.depth))
            .collect();
        assert_eq!(
            pis,
            vec![
                (TokenType::PiName, 5, -1),
                (TokenType::PiVal, 3, -1),
                (TokenType::PiName, 5, 0),
                (TokenType::PiVal, 0, 0),
                (TokenType::PiName, 4, -1),
                (TokenType::PiVal, 1, -1),
            ]
        );
    }

    #[test]
    fn test_reserved_pi_target() {
        assert!(fails(b"<r><?xml x?></r>"));
        assert!(fails(b"<r/><?XmL?>"));
        assert!(!fails(b"<r><?xml-stylesheet x?></r>"));
    }

    #[test]
    fn test_doctype() {
        let t = tokens(b"<!DOCTYPE r [<!ELEMENT r ANY>]><r/>");
        let dtd = t.iter().find(|t| t.kind == TokenType::DtdVal).unwrap();
        assert_eq!((dtd.offset, dtd.len()), (9, 21));
        assert!(fails(b"<!DOCTYPE r><!DOCTYPE r><r/>"));
        assert!(fails(b"<r><!DOCTYPE r></r>"));
    }

    #[test]
    fn test_document_tail() {
        assert!(!fails(b"<r/>\n<!-- done -->\n<?pi?>\n"));
        assert!(fails(b"<r/><"));
        assert!(fails(b"<r/><r/>"));
        assert!(fails(b"<r/><!DOCTYPE r>"));
    }

    #[test]
    fn test_whitespace_after_comment() {
        let config = ParserConfig::default().with_whitespace(true);
        let index = VtdGen::with_config(config).parse(b"<r><!--c--> <a/></r>".to_vec(), false).unwrap();
        let text: Vec<_> = index.tokens().filter(|t| t.kind == TokenType::CharacterData).collect();
        assert_eq!(text.len(), 1);
        assert_eq!((text[0].offset, text[0].len()), (11, 1));
    }
}

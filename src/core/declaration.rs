//! XML Declaration
//!
//! Lexes `<?xml version=... encoding=... standalone=...?>` into
//! `DecAttrName`/`DecAttrVal` token pairs. The encoding pseudo-attribute
//! may switch the reader's decoder; it is checked against what the byte
//! order mark (or its absence) already established.

use crate::core::chars::is_space_char;
use crate::core::encoding::{check_size, Bom, Encoding};
use crate::error::{ParseError, Result};
use crate::index::token::TokenType;

use super::tokenizer::{Cursor, Lexer, State, DQUOTE, EQ, GT, LT, QM, SQUOTE};

/// Longest encoding label accepted
const MAX_LABEL_LEN: usize = 40;

impl Lexer<'_, '_> {
    /// `<?xml` and whitespace have been read; `cur.ch` holds the next char
    pub(super) fn declaration(&mut self, cur: &mut Cursor) -> Result<State> {
        let start = self.r.prev();
        if cur.ch != 'v' as u32 || !self.r.skip_str("ersion")? {
            return Err(ParseError::syntax("XML declaration must start with version"));
        }
        self.decl_name(start, 7);
        let quote = self.eq_quote()?;
        let value = self.r.offset();
        if !(self.r.skip_str("1.")? && (self.r.skip_char('0' as u32)? || self.r.skip_char('1' as u32)?)) {
            return Err(ParseError::syntax("unsupported XML version"));
        }
        self.emit(TokenType::DecAttrVal, value, 3 * self.inc(), -1);
        self.close_quote(quote)?;

        let mut c = self.r.get_char()?;
        let mut spaced = is_space_char(c);
        if spaced {
            c = self.r.get_char_after_space()?;
        }
        if spaced && c == 'e' as u32 {
            self.encoding_decl()?;
            c = self.r.get_char()?;
            spaced = is_space_char(c);
            if spaced {
                c = self.r.get_char_after_space()?;
            }
        }
        if spaced && c == 's' as u32 {
            self.standalone_decl()?;
            c = self.r.get_char_after_space()?;
        }

        if c != QM || !self.r.skip_char(GT)? {
            return Err(ParseError::syntax("invalid XML declaration termination"));
        }
        if self.r.get_char_after_space()? != LT {
            return Err(ParseError::syntax("invalid char after XML declaration"));
        }
        Ok(State::LtSeen)
    }

    fn decl_name(&mut self, start: usize, chars: usize) {
        let len = chars * self.inc();
        self.emit(TokenType::DecAttrName, start, len, -1);
    }

    /// `S? = S? quote`
    fn eq_quote(&mut self) -> Result<u32> {
        let mut c = self.r.get_char()?;
        if is_space_char(c) {
            c = self.r.get_char_after_space()?;
        }
        if c != EQ {
            return Err(ParseError::syntax("'=' expected in XML declaration"));
        }
        let c = self.r.get_char_after_space()?;
        if c != DQUOTE && c != SQUOTE {
            return Err(ParseError::syntax("quote expected in XML declaration"));
        }
        Ok(c)
    }

    fn close_quote(&mut self, quote: u32) -> Result<()> {
        if !self.r.skip_char(quote)? {
            return Err(ParseError::syntax("unterminated value in XML declaration"));
        }
        Ok(())
    }

    fn encoding_decl(&mut self) -> Result<()> {
        let start = self.r.prev();
        if !self.r.skip_str("ncoding")? {
            return Err(ParseError::syntax("encoding expected in XML declaration"));
        }
        self.decl_name(start, 8);
        let quote = self.eq_quote()?;
        let value = self.r.offset();
        let mut label = String::new();
        loop {
            let c = self.r.get_char()?;
            if c == quote {
                break;
            }
            let valid = char::from_u32(c).is_some_and(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
            if !valid || label.len() >= MAX_LABEL_LEN {
                return Err(ParseError::encoding("malformed encoding name"));
            }
            label.push(c as u8 as char);
        }
        let len = self.r.prev() - value;
        self.emit(TokenType::DecAttrVal, value, len, -1);
        self.switch_declared_encoding(&label)
    }

    /// Reconcile a declared encoding with the detected one
    fn switch_declared_encoding(&mut self, label: &str) -> Result<()> {
        let current = self.r.encoding();
        if label.eq_ignore_ascii_case("UTF-16") {
            if !current.is_utf16() {
                return Err(ParseError::encoding(format!("can't switch from {current} to UTF-16")));
            }
            if self.bom != Bom::Utf16 {
                return Err(ParseError::encoding("UTF-16 declared without a byte order mark"));
            }
            return Ok(());
        }

        let declared = Encoding::from_label(label)
            .ok_or_else(|| ParseError::encoding(format!("unsupported encoding {label}")))?;
        if current.is_utf16() {
            if declared != current {
                return Err(ParseError::encoding(format!(
                    "declared encoding {declared} contradicts the detected {current}"
                )));
            }
            return Ok(());
        }
        if declared.is_utf16() {
            return Err(ParseError::encoding(format!("can't switch from {current} to {declared}")));
        }
        if self.bom == Bom::Utf8 && declared != Encoding::Utf8 {
            return Err(ParseError::encoding(format!(
                "can't switch from UTF-8 to {declared} after a UTF-8 byte order mark"
            )));
        }
        if declared != current {
            check_size(declared, self.r.end(), self.namespace_aware)?;
            tracing::debug!(from = %current, to = %declared, "switching encoding from XML declaration");
            self.r.switch_encoding(declared);
        }
        Ok(())
    }

    fn standalone_decl(&mut self) -> Result<()> {
        let start = self.r.prev();
        if !self.r.skip_str("tandalone")? {
            return Err(ParseError::syntax("standalone expected in XML declaration"));
        }
        self.decl_name(start, 10);
        let quote = self.eq_quote()?;
        let value = self.r.offset();
        let chars = if self.r.skip_str("yes")? {
            3
        } else if self.r.skip_str("no")? {
            2
        } else {
            return Err(ParseError::syntax("standalone must be yes or no"));
        };
        self.emit(TokenType::DecAttrVal, value, chars * self.inc(), -1);
        self.close_quote(quote)
    }
}

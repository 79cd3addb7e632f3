//! Elixir Term Conversion Utilities
//!
//! Converts tokens, indices and errors to Elixir terms.

use rustler::{Atom, Encoder, Env, NewBinary, Term};

use crate::error::{IndexError, ParseError};
use crate::index::{Token, TokenType, VtdIndex};

// Pre-defined atoms for efficiency - created once at compile time
rustler::atoms! {
    ok,
    error,
    // error kinds
    encoding,
    entity,
    eof,
    syntax,
    index,
    // token types
    start_tag,
    end_tag,
    attr_name,
    attr_ns,
    attr_val,
    character_data,
    comment,
    pi_name,
    pi_val,
    dec_attr_name,
    dec_attr_val,
    cdata,
    dtd_val,
    document,
}

pub fn token_type_atom(kind: TokenType) -> Atom {
    match kind {
        TokenType::StartTag => start_tag(),
        TokenType::EndTag => end_tag(),
        TokenType::AttrName => attr_name(),
        TokenType::AttrNs => attr_ns(),
        TokenType::AttrVal => attr_val(),
        TokenType::CharacterData => character_data(),
        TokenType::Comment => comment(),
        TokenType::PiName => pi_name(),
        TokenType::PiVal => pi_val(),
        TokenType::DecAttrName => dec_attr_name(),
        TokenType::DecAttrVal => dec_attr_val(),
        TokenType::Cdata => cdata(),
        TokenType::DtdVal => dtd_val(),
        TokenType::Document => document(),
    }
}

/// `{type, depth, offset, length}`; qualified names report their full length
pub fn token_to_term<'a>(env: Env<'a>, token: Token) -> Term<'a> {
    (token_type_atom(token.kind), token.depth, token.offset, token.len()).encode(env)
}

/// All tokens of an index, in document order
pub fn tokens_to_term<'a>(env: Env<'a>, index: &VtdIndex) -> Term<'a> {
    let mut list = Term::list_new_empty(env);
    for packed in index.packed_tokens().iter().rev() {
        list = list.list_prepend(token_to_term(env, packed.unpack()));
    }
    list
}

/// Copy bytes into a new binary
pub fn bytes_to_binary<'a>(env: Env<'a>, bytes: &[u8]) -> Term<'a> {
    let mut binary = NewBinary::new(env, bytes.len());
    binary.as_mut_slice().copy_from_slice(bytes);
    binary.into()
}

/// `{:error, {kind, message}}`
pub fn parse_error_to_term<'a>(env: Env<'a>, err: &ParseError) -> Term<'a> {
    let kind = match err {
        ParseError::Encoding { .. } => encoding(),
        ParseError::Entity { .. } => entity(),
        ParseError::Eof => eof(),
        ParseError::Syntax { .. } => syntax(),
    };
    (error(), (kind, err.to_string())).encode(env)
}

pub fn index_error_to_term<'a>(env: Env<'a>, err: &IndexError) -> Term<'a> {
    (error(), (index(), err.to_string())).encode(env)
}

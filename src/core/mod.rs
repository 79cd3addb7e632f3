//! Core lexing primitives
//!
//! Everything needed to turn document bytes into tokens:
//! - Encoding: encoding detection, BOM handling and size limits
//! - Decoder: byte-to-code-point decoders per encoding
//! - Reader: character cursor over the document
//! - Chars: XML 1.0 character classes
//! - Entities: character and entity reference validation
//! - Namespace: scope stack for namespace-aware parsing
//! - Tokenizer: the lexer state machine (with `declaration` and `markup`)

pub mod chars;
mod declaration;
pub mod decoder;
pub mod encoding;
pub mod entities;
mod markup;
pub mod namespace;
pub mod reader;
pub mod tokenizer;

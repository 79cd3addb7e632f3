//! Parse and Index Errors
//!
//! Closed error taxonomy for the generator:
//! - `Encoding`: unrecognized or contradictory byte order, declared encoding,
//!   undecodable bytes, document larger than the addressable range
//! - `Entity`: malformed or unknown character/entity references
//! - `Eof`: input ended before the document was complete
//! - `Syntax`: every other grammar or structural violation
//!
//! Positions are attached at the parse boundary, so lexing code can raise
//! errors without carrying the cursor around.

use std::fmt;

use thiserror::Error;

/// 1-based line and column of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Renders ` (line L, column C)` or nothing.
pub struct At<'a>(pub &'a Option<Position>);

impl fmt::Display for At<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(pos) => write!(f, " ({})", pos),
            None => Ok(()),
        }
    }
}

/// Fatal parse failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("encoding error: {message}{}", At(.position))]
    Encoding {
        message: String,
        position: Option<Position>,
    },

    #[error("entity error: {message}{}", At(.position))]
    Entity {
        message: String,
        position: Option<Position>,
    },

    #[error("premature end of document")]
    Eof,

    #[error("parse error: {message}{}", At(.position))]
    Syntax {
        message: String,
        /// Byte offset the error refers to, when it is not the cursor
        offset: Option<usize>,
        position: Option<Position>,
    },
}

impl ParseError {
    pub fn encoding(message: impl Into<String>) -> Self {
        ParseError::Encoding {
            message: message.into(),
            position: None,
        }
    }

    pub fn entity(message: impl Into<String>) -> Self {
        ParseError::Entity {
            message: message.into(),
            position: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        ParseError::Syntax {
            message: message.into(),
            offset: None,
            position: None,
        }
    }

    /// Structural error reported at a specific byte offset
    pub fn syntax_at(message: impl Into<String>, offset: usize) -> Self {
        ParseError::Syntax {
            message: message.into(),
            offset: Some(offset),
            position: None,
        }
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, ParseError::Eof)
    }

    /// Short machine-readable kind, used for NIF error tuples
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::Encoding { .. } => "encoding",
            ParseError::Entity { .. } => "entity",
            ParseError::Eof => "eof",
            ParseError::Syntax { .. } => "syntax",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Encoding { message, .. }
            | ParseError::Entity { message, .. }
            | ParseError::Syntax { message, .. } => message,
            ParseError::Eof => "premature end of document",
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            ParseError::Encoding { position, .. }
            | ParseError::Entity { position, .. }
            | ParseError::Syntax { position, .. } => *position,
            ParseError::Eof => None,
        }
    }

    /// Offset the error names explicitly, if any
    pub(crate) fn explicit_offset(&self) -> Option<usize> {
        match self {
            ParseError::Syntax { offset, .. } => *offset,
            _ => None,
        }
    }

    /// Attach a position unless one is already present
    pub(crate) fn with_position(mut self, pos: Position) -> Self {
        match &mut self {
            ParseError::Encoding { position, .. }
            | ParseError::Entity { position, .. }
            | ParseError::Syntax { position, .. } => {
                if position.is_none() {
                    *position = Some(pos);
                }
            }
            ParseError::Eof => {}
        }
        self
    }
}

/// Failure while writing or loading a persisted index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an index file (bad magic)")]
    BadMagic,

    #[error("unsupported index format version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown encoding code {0}")]
    UnknownEncoding(u8),

    #[error("corrupt index: {0}")]
    Corrupt(&'static str),

    #[error("document size mismatch: index expects {expected} bytes, found {actual}")]
    DocumentSizeMismatch { expected: u64, actual: u64 },

    #[error("index does not embed its document; load it with the document bytes")]
    MissingDocument,
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_position() {
        let err = ParseError::syntax("tag mismatch").with_position(Position { line: 3, column: 7 });
        assert_eq!(err.to_string(), "parse error: tag mismatch (line 3, column 7)");
    }

    #[test]
    fn test_display_without_position() {
        let err = ParseError::entity("unknown entity &foo;");
        assert_eq!(err.to_string(), "entity error: unknown entity &foo;");
    }

    #[test]
    fn test_position_not_overwritten() {
        let first = Position { line: 1, column: 2 };
        let err = ParseError::encoding("bad")
            .with_position(first)
            .with_position(Position { line: 9, column: 9 });
        assert_eq!(err.position(), Some(first));
    }

    #[test]
    fn test_eof_has_no_position() {
        let err = ParseError::Eof.with_position(Position { line: 1, column: 1 });
        assert!(err.is_eof());
        assert_eq!(err.position(), None);
        assert_eq!(err.kind(), "eof");
    }

    #[test]
    fn test_explicit_offset() {
        assert_eq!(ParseError::syntax_at("x", 12).explicit_offset(), Some(12));
        assert_eq!(ParseError::syntax("x").explicit_offset(), None);
    }
}

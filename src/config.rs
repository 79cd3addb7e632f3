//! Parser Configuration
//!
//! Per-generator options. Namespace awareness is not part of it: like the
//! document range, it is chosen on every parse call.

use crate::index::location::{FULL_LEVELS, SHALLOW_LEVELS};

/// Documents larger than this get the five-level location cache under
/// `LcDepth::Auto`
pub const AUTO_FULL_LC_THRESHOLD: usize = 1024 * 1024;

/// How many element depths the location cache covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LcDepth {
    /// Levels 1-3
    Shallow,
    /// Levels 1-5
    Full,
    /// Pick by document size
    #[default]
    Auto,
}

impl LcDepth {
    /// Level count for a document of `doc_len` bytes
    pub fn levels_for(self, doc_len: usize) -> usize {
        match self {
            LcDepth::Shallow => SHALLOW_LEVELS,
            LcDepth::Full => FULL_LEVELS,
            LcDepth::Auto if doc_len > AUTO_FULL_LC_THRESHOLD => FULL_LEVELS,
            LcDepth::Auto => SHALLOW_LEVELS,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shallow" => Some(LcDepth::Shallow),
            "full" => Some(LcDepth::Full),
            "auto" => Some(LcDepth::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserConfig {
    /// Emit character data tokens for whitespace-only runs between tags
    pub record_whitespace: bool,
    pub lc_depth: LcDepth,
}

impl ParserConfig {
    pub fn with_whitespace(mut self, record: bool) -> Self {
        self.record_whitespace = record;
        self
    }

    pub fn with_lc_depth(mut self, depth: LcDepth) -> Self {
        self.lc_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_depth() {
        assert_eq!(LcDepth::Auto.levels_for(10), SHALLOW_LEVELS);
        assert_eq!(LcDepth::Auto.levels_for(AUTO_FULL_LC_THRESHOLD), SHALLOW_LEVELS);
        assert_eq!(LcDepth::Auto.levels_for(AUTO_FULL_LC_THRESHOLD + 1), FULL_LEVELS);
        assert_eq!(LcDepth::Full.levels_for(10), FULL_LEVELS);
        assert_eq!(LcDepth::Shallow.levels_for(usize::MAX), SHALLOW_LEVELS);
    }

    #[test]
    fn test_defaults() {
        let config = ParserConfig::default();
        assert!(!config.record_whitespace);
        assert_eq!(config.lc_depth, LcDepth::Auto);
        let config = config.with_whitespace(true).with_lc_depth(LcDepth::Full);
        assert!(config.record_whitespace);
        assert_eq!(config.lc_depth, LcDepth::Full);
    }

    #[test]
    fn test_names() {
        assert_eq!(LcDepth::from_name("full"), Some(LcDepth::Full));
        assert_eq!(LcDepth::from_name("deep"), None);
    }
}

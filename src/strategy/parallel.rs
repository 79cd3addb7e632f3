//! Parallel Batch Parsing
//!
//! Uses Rayon to index independent documents concurrently. Each worker
//! thread gets its own `VtdGen` (and so its own arena and namespace
//! stack); nothing mutable is shared between documents.

use rayon::prelude::*;

use crate::config::ParserConfig;
use crate::error::ParseError;
use crate::generator::VtdGen;
use crate::index::vtd::VtdIndex;

/// Parse every document, preserving input order in the results
pub fn parse_batch(
    docs: Vec<Vec<u8>>,
    namespace_aware: bool,
    config: ParserConfig,
) -> Vec<Result<VtdIndex, ParseError>> {
    tracing::debug!(documents = docs.len(), namespace_aware, "parsing batch");
    docs.into_par_iter()
        .map_init(
            || VtdGen::with_config(config),
            |gen, doc| gen.parse(doc, namespace_aware),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::token::TokenType;

    #[test]
    fn test_batch_preserves_order() {
        let docs: Vec<Vec<u8>> = (0..64)
            .map(|i| format!("<r{i}><a>{i}</a></r{i}>").into_bytes())
            .collect();
        let results = parse_batch(docs, false, ParserConfig::default());
        assert_eq!(results.len(), 64);
        for (i, result) in results.into_iter().enumerate() {
            let index = result.unwrap();
            let root = index.root_index().unwrap() as usize;
            assert_eq!(index.raw_string(root).unwrap(), format!("r{i}"));
        }
    }

    #[test]
    fn test_batch_isolates_failures() {
        let docs = vec![
            b"<a/>".to_vec(),
            b"<a>".to_vec(),
            b"<p:a/>".to_vec(),
            b"<a xmlns:p='urn:p'><p:b/></a>".to_vec(),
        ];
        let results = parse_batch(docs, true, ParserConfig::default());
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(ParseError::Eof));
        assert!(results[2].is_err());
        let last = results[3].as_ref().unwrap();
        assert_eq!(last.tokens().filter(|t| t.kind == TokenType::StartTag).count(), 2);
    }

    #[test]
    fn test_batch_matches_sequential() {
        let docs: Vec<Vec<u8>> = (0..16)
            .map(|i| format!("<r>{}</r>", "<x/>".repeat(i)).into_bytes())
            .collect();
        let sequential: Vec<_> = docs
            .iter()
            .map(|d| VtdGen::new().parse(d.clone(), false).unwrap())
            .collect();
        let parallel: Vec<_> = parse_batch(docs, false, ParserConfig::default())
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(parallel, sequential);
    }
}

//! Parsing Strategy Module
//!
//! - Single document: `VtdGen::parse` / `parse_range` / `parse_reusing`
//! - Batch: many independent documents on the rayon pool (`parallel`)

pub mod parallel;

pub use parallel::parse_batch;

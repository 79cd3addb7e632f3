//! VTD Index Module
//!
//! The parse result is a flat token buffer plus a location cache, both
//! referring into the original document by offset:
//!
//! ```text
//! VtdIndex
//! ├── doc: Vec<u8>                  # the parsed buffer, never copied
//! ├── tokens: Vec<PackedToken>      # 8 bytes each
//! └── lc: LocationCache
//!     ├── upper: Vec<Vec<LcEntry>>  # levels 1..L-1, 8 bytes each
//!     └── leaves: Vec<u32>          # level L token indices
//! ```
//!
//! Indices can be written to disk and loaded back without reparsing
//! (see `persist`).

pub mod builder;
pub mod location;
pub mod persist;
pub mod token;
pub mod vtd;

pub use location::{LcEntry, LocationCache};
pub use token::{PackedToken, Token, TokenType};
pub use vtd::VtdIndex;

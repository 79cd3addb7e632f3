//! ResourceArc Wrappers
//!
//! A parsed index stays on the Rust side; Elixir holds a reference to it.
//! Indices are immutable once built, so no lock is needed.

use rustler::ResourceArc;

use crate::index::VtdIndex;

pub struct IndexResource {
    index: VtdIndex,
}

impl IndexResource {
    pub fn new(index: VtdIndex) -> Self {
        IndexResource { index }
    }

    #[inline]
    pub fn index(&self) -> &VtdIndex {
        &self.index
    }
}

#[rustler::resource_impl]
impl rustler::Resource for IndexResource {}

/// Type alias for the ResourceArc
pub type IndexRef = ResourceArc<IndexResource>;

//! Location Cache
//!
//! Per-depth buffers that let a navigator jump between elements without
//! scanning the token buffer. Levels are 1-based element depths (the root
//! is depth 0 and is recorded separately as the root pointer).
//!
//! ```text
//! level 1 .. n-1 : LcEntry { token, first_child }   first_child indexes level+1
//! level n        : token index only
//! ```
//!
//! Entries are written lazily: the entry for an element is only appended
//! once the parser knows whether it has children, i.e. when the next element
//! at the same or a shallower depth, or its first child, shows up. At most
//! one element per level is pending at any time.

/// Levels kept in shallow mode
pub const SHALLOW_LEVELS: usize = 3;
/// Levels kept in full mode
pub const FULL_LEVELS: usize = 5;

/// Location cache entry of an element above the deepest level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LcEntry {
    /// Index of the element's start tag in the token buffer
    pub token: u32,
    /// Position of the first child's entry in the next level
    pub first_child: Option<u32>,
}

impl LcEntry {
    const NO_CHILD: u32 = u32::MAX;

    /// Packed form used by index files: token in the high half
    #[inline]
    pub fn to_raw(self) -> u64 {
        ((self.token as u64) << 32) | self.first_child.unwrap_or(Self::NO_CHILD) as u64
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        let child = raw as u32;
        LcEntry {
            token: (raw >> 32) as u32,
            first_child: (child != Self::NO_CHILD).then_some(child),
        }
    }
}

/// The location cache of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationCache {
    /// Levels 1..n-1
    upper: Vec<Vec<LcEntry>>,
    /// Level n
    leaves: Vec<u32>,
}

impl LocationCache {
    pub fn new(levels: usize) -> Self {
        debug_assert!(levels == SHALLOW_LEVELS || levels == FULL_LEVELS);
        LocationCache {
            upper: vec![Vec::new(); levels - 1],
            leaves: Vec::new(),
        }
    }

    pub fn with_capacity(levels: usize, per_level: usize) -> Self {
        let mut lc = Self::new(levels);
        lc.reserve(per_level);
        lc
    }

    pub(crate) fn from_parts(upper: Vec<Vec<LcEntry>>, leaves: Vec<u32>) -> Self {
        LocationCache { upper, leaves }
    }

    /// Number of levels, 3 or 5
    #[inline]
    pub fn levels(&self) -> usize {
        self.upper.len() + 1
    }

    /// Entries of a level in `1..levels()`
    #[inline]
    pub fn entries(&self, level: usize) -> &[LcEntry] {
        &self.upper[level - 1]
    }

    /// Token indices of the deepest level
    #[inline]
    pub fn leaves(&self) -> &[u32] {
        &self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.upper.iter().all(Vec::is_empty)
    }

    pub(crate) fn upper_levels(&self) -> &[Vec<LcEntry>] {
        &self.upper
    }

    fn reserve(&mut self, per_level: usize) {
        for level in &mut self.upper {
            level.reserve(per_level);
        }
        self.leaves.reserve(per_level);
    }

    /// Clear entries and switch level count, keeping allocations
    pub(crate) fn reset(&mut self, levels: usize) {
        self.upper.truncate(levels - 1);
        while self.upper.len() < levels - 1 {
            self.upper.push(Vec::new());
        }
        for level in &mut self.upper {
            level.clear();
        }
        self.leaves.clear();
    }

    /// Release over-allocated capacity
    pub(crate) fn shrink_to_fit(&mut self) {
        for level in &mut self.upper {
            level.shrink_to_fit();
        }
        self.leaves.shrink_to_fit();
    }

    /// Bytes used by the cache entries
    pub fn byte_size(&self) -> usize {
        self.upper.iter().map(|l| l.len() * 8).sum::<usize>() + self.leaves.len() * 4
    }
}

/// Threads start tags into a `LocationCache` as they are emitted
#[derive(Debug, Clone)]
pub(crate) struct LcThreader {
    /// Depth of the last element written, 0 before any level-1 element
    last_depth: usize,
    /// Token index of the last element written at each depth
    last_index: [u32; FULL_LEVELS + 1],
}

impl Default for LcThreader {
    fn default() -> Self {
        LcThreader {
            last_depth: 0,
            last_index: [0; FULL_LEVELS + 1],
        }
    }
}

impl LcThreader {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record the start tag at `token` whose depth is `depth` (>= 1)
    pub fn record(&mut self, lc: &mut LocationCache, depth: usize, token: u32) {
        let levels = lc.levels();
        if depth > levels {
            return;
        }
        if depth == levels {
            lc.leaves.push(token);
            if self.last_depth == levels - 1 {
                let parent = self.last_index[levels - 1];
                lc.upper[levels - 2].push(LcEntry {
                    token: parent,
                    first_child: Some(lc.leaves.len() as u32 - 1),
                });
            }
        } else if self.last_depth + 1 == depth && depth >= 2 {
            // First child: the parent's entry points at the slot this
            // element will occupy in its own level.
            let parent = self.last_index[depth - 1];
            let child_slot = lc.upper[depth - 1].len() as u32;
            lc.upper[depth - 2].push(LcEntry {
                token: parent,
                first_child: Some(child_slot),
            });
        } else {
            self.flush_pending(lc, depth);
        }
        self.last_index[depth] = token;
        self.last_depth = depth;
    }

    /// Write the entry left pending at the end of the document
    pub fn finish(&mut self, lc: &mut LocationCache) {
        self.flush_pending(lc, 1);
    }

    /// A pending childless entry exists at `last_depth` when it is at least
    /// `min_depth` and above the leaf level.
    fn flush_pending(&mut self, lc: &mut LocationCache, min_depth: usize) {
        let d = self.last_depth;
        if d >= min_depth && d >= 1 && d < lc.levels() {
            lc.upper[d - 1].push(LcEntry {
                token: self.last_index[d],
                first_child: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(levels: usize, depths: &[usize]) -> LocationCache {
        let mut lc = LocationCache::new(levels);
        let mut t = LcThreader::default();
        for (i, &d) in depths.iter().enumerate() {
            t.record(&mut lc, d, i as u32 + 10);
        }
        t.finish(&mut lc);
        lc
    }

    fn entry(token: u32, child: Option<u32>) -> LcEntry {
        LcEntry { token, first_child: child }
    }

    #[test]
    fn test_raw_round_trip() {
        let e = entry(7, Some(3));
        assert_eq!(LcEntry::from_raw(e.to_raw()), e);
        let leaf = entry(9, None);
        assert_eq!(leaf.to_raw() & 0xFFFF_FFFF, 0xFFFF_FFFF);
        assert_eq!(LcEntry::from_raw(leaf.to_raw()), leaf);
    }

    #[test]
    fn test_flat_siblings() {
        // <r><a/><b/><c/></r>
        let lc = thread(3, &[1, 1, 1]);
        assert_eq!(
            lc.entries(1),
            &[entry(10, None), entry(11, None), entry(12, None)]
        );
        assert!(lc.entries(2).is_empty());
        assert!(lc.leaves().is_empty());
    }

    #[test]
    fn test_first_child_links() {
        // <r><a><b/><b/></a><c><b><x/></b></c></r>
        let lc = thread(3, &[1, 2, 2, 1, 2, 3]);
        assert_eq!(lc.entries(1), &[entry(10, Some(0)), entry(13, Some(2))]);
        assert_eq!(
            lc.entries(2),
            &[entry(11, None), entry(12, None), entry(14, Some(0))]
        );
        assert_eq!(lc.leaves(), &[15]);
    }

    #[test]
    fn test_child_slot_matches_child_entry() {
        let lc = thread(5, &[1, 2, 3, 4, 5, 4, 1]);
        for level in 1..lc.levels() - 1 {
            for e in lc.entries(level) {
                if let Some(child) = e.first_child {
                    let child_entry = lc.entries(level + 1)[child as usize];
                    assert!(child_entry.token > e.token);
                }
            }
        }
        assert_eq!(lc.entries(4), &[entry(13, Some(0)), entry(15, None)]);
        assert_eq!(lc.leaves(), &[14]);
    }

    #[test]
    fn test_deeper_than_cache_ignored() {
        let lc = thread(3, &[1, 2, 3, 4, 5, 3]);
        assert_eq!(lc.leaves(), &[12, 15]);
        assert_eq!(lc.entries(2), &[entry(11, Some(0))]);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut lc = LocationCache::with_capacity(5, 64);
        lc.reset(3);
        assert_eq!(lc.levels(), 3);
        assert!(lc.is_empty());
        lc.reset(5);
        assert_eq!(lc.levels(), 5);
    }
}

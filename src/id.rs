//! ID types for graphcomp
//!
//! Two handle spaces exist side by side:
//! - `NodeId`: index of a brick in a `WeightStore` arena (never reused)
//! - `RectId`: index of a rectangle slot in a `Partition` (reused after deletion)
//!
//! Index values along a dimension are plain `usize` (`Index`).

use std::fmt;

/// Index value along one dimension (a node of the graph on that axis)
pub type Index = usize;

/// Brick handle inside a `WeightStore` arena
pub type NodeId = usize;

/// Rectangle handle inside a `Partition` slab.
///
/// Handles are totally ordered. Every ordered list of rectangles in the
/// crate (partition members, register lines, overlap sets) is sorted by
/// handle, which the merge-based set operations rely on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RectId(usize);

impl RectId {
    #[inline]
    pub fn from_usize(slot: usize) -> Self {
        Self(slot)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for RectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for RectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

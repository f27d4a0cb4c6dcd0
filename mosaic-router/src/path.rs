use mosaic_graph::EdgeId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A least-cost walk through the graph.
///
/// Consecutive segments share a vertex. Each segment pairs a canonical edge
/// id with the direction it is traversed in (`true` = along the edge's
/// canonical orientation).
///
/// `offset1` and `offset2` locate the walk's endpoints on its first and
/// last edges, measured *forward along the segment's traversal direction*:
/// when a segment's direction flag is false, the stored offset is
/// `u16::MAX - canonical_offset`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Path {
    pub segments: Vec<(EdgeId, bool)>,
    pub offset1: u16,
    pub offset2: u16,
    /// The total cost under the cost model the search ran with.
    pub weight: f64,
}

impl Path {
    /// The number of edges in the walk.
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

//! # Cost models
//!
//! The search is parameterized by a [`CostModel`]: for every candidate edge
//! it receives an [`EdgeEnumerator`] positioned on that edge (direction
//! included) and the trailing edge ids of the search path, and returns the
//! cost of traversing the full edge plus the cost of the turn onto it.
//!
//! Sentinel values carry structural meaning:
//!
//! - an edge cost `<= 0` means the edge cannot be traversed in this
//!   direction at all;
//! - an edge cost `>= f64::MAX` means the edge may carry a target but the
//!   search must not expand beyond it;
//! - a turn cost `< 0` means the turn is prohibited.
//!
//! Models must be pure given their inputs; the search may evaluate an edge
//! any number of times.

use crate::dijkstra::PreviousEdges;
use mosaic_graph::EdgeEnumerator;

/// The price of traversing an edge and of the turn leading onto it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weight {
    /// Cost of traversing the whole edge in the queried direction.
    pub edge: f64,
    /// Cost of turning onto the edge from the previous one.
    pub turn: f64,
}

impl Weight {
    /// An edge that cannot be traversed.
    pub const IMPASSABLE: Weight = Weight {
        edge: 0.0,
        turn: 0.0,
    };

    #[inline]
    pub const fn new(edge: f64, turn: f64) -> Self {
        Self { edge, turn }
    }

    /// Whether the edge is usable at all: traversable, finite, and with an
    /// allowed turn.
    #[inline]
    pub fn admits(&self) -> bool {
        self.edge > 0.0 && self.edge < f64::MAX && self.turn >= 0.0
    }
}

pub trait CostModel {
    /// Prices the edge the enumerator is positioned on, traversed in the
    /// enumerator's direction, arriving via `previous` (most recent edge
    /// first; empty at the search origin).
    fn weight(&self, edge: &EdgeEnumerator<'_>, previous: PreviousEdges<'_>) -> Weight;
}

/// Shortest-distance costing: every edge costs its stored length in
/// meters, turns are free. Edges without a stored length are impassable.
pub struct DistanceCost;

impl CostModel for DistanceCost {
    fn weight(&self, edge: &EdgeEnumerator<'_>, _previous: PreviousEdges<'_>) -> Weight {
        match edge.length_cm() {
            Some(length_cm) => Weight::new(f64::from(length_cm) / 100.0, 0.0),
            None => Weight::IMPASSABLE,
        }
    }
}

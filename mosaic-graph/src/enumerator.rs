//! # Edge enumeration
//!
//! The [`EdgeEnumerator`] is the read surface everything above the storage
//! layer consumes: snapping walks it over the vertices of a search box,
//! the search loop walks it over a vertex's outgoing edges, and cost
//! callbacks receive it positioned at the edge being priced so they can
//! consult lengths, attribute bags, and turn-cost tables.
//!
//! An enumerator is positioned either on a vertex (after which
//! [`EdgeEnumerator::move_next`] steps through that vertex's adjacency
//! chain) or directly on an edge with an explicit traversal direction.
//! Accessors are oriented: [`tail`](EdgeEnumerator::tail) is the vertex the
//! traversal leaves from, and [`forward`](EdgeEnumerator::forward) reports
//! whether the traversal follows the edge's canonical direction.

use crate::graph_tile::{EdgeRecord, GraphTile, TurnCostTable};
use crate::network::RoutingNetwork;
use crate::{EdgeId, VertexId};
use geo::Coord;

pub struct EdgeEnumerator<'a> {
    network: &'a RoutingNetwork,
    tile: Option<&'a GraphTile>,
    record: Option<EdgeRecord>,
    /// The vertex whose chain is being walked (EMPTY when positioned by edge).
    source_vertex: VertexId,
    next_offset: Option<u32>,
    /// Whether the current traversal runs record-vertex1 -> record-vertex2.
    forward_raw: bool,
}

impl<'a> EdgeEnumerator<'a> {
    pub(crate) fn new(network: &'a RoutingNetwork) -> Self {
        Self {
            network,
            tile: None,
            record: None,
            source_vertex: VertexId::EMPTY,
            next_offset: None,
            forward_raw: true,
        }
    }

    /// Positions the enumerator on a vertex; `move_next` then steps through
    /// its incident edges. Returns false if the vertex does not exist.
    pub fn move_to(&mut self, vertex: VertexId) -> bool {
        self.record = None;
        self.next_offset = None;
        self.source_vertex = vertex;

        let Some(tile) = self.network.tile(vertex.tile_id) else {
            self.tile = None;
            return false;
        };
        self.tile = Some(tile);
        if vertex.local_id >= tile.vertex_count() {
            return false;
        }
        self.next_offset = tile.head_pointer(vertex.local_id);
        true
    }

    /// Advances to the next incident edge of the current vertex.
    pub fn move_next(&mut self) -> bool {
        let Some(tile) = self.tile else {
            return false;
        };
        let Some(offset) = self.next_offset else {
            self.record = None;
            return false;
        };

        let record = tile.record_at(offset);
        if record.vertex1 == self.source_vertex {
            self.forward_raw = true;
            self.next_offset = record.previous1;
        } else {
            self.forward_raw = false;
            self.next_offset = record.previous2;
        }
        self.record = Some(record);
        true
    }

    /// Positions the enumerator directly on an edge.
    ///
    /// `forward` selects the traversal direction relative to the edge's
    /// canonical orientation. Accepts both canonical and mirror ids.
    /// Returns false if the edge (or its tile) is not present.
    pub fn move_to_edge(&mut self, edge: EdgeId, forward: bool) -> bool {
        self.record = None;
        self.next_offset = None;
        self.source_vertex = VertexId::EMPTY;

        let Some(tile) = self.network.tile(edge.tile_id) else {
            self.tile = None;
            return false;
        };
        self.tile = Some(tile);
        let Some(offset) = tile.offset_for(edge) else {
            return false;
        };

        let record = tile.record_at(offset);
        let mirror = record
            .canonical
            .is_some_and(|canonical| canonical.tile_id != tile.tile_id());
        self.forward_raw = if mirror { !forward } else { forward };
        self.source_vertex = if self.forward_raw {
            record.vertex1
        } else {
            record.vertex2
        };
        self.record = Some(record);
        true
    }

    fn is_mirror_record(&self) -> bool {
        match (self.tile, self.record.as_ref()) {
            (Some(tile), Some(record)) => record
                .canonical
                .is_some_and(|canonical| canonical.tile_id != tile.tile_id()),
            _ => false,
        }
    }

    /// The canonical id of the current edge, or EMPTY if unpositioned.
    pub fn edge_id(&self) -> EdgeId {
        let (Some(tile), Some(record)) = (self.tile, self.record.as_ref()) else {
            return EdgeId::EMPTY;
        };
        match record.canonical {
            Some(canonical) => canonical,
            None => match tile.local_id_for_offset(record.offset) {
                Some(local_id) => EdgeId::new(tile.tile_id(), local_id),
                None => EdgeId::EMPTY,
            },
        }
    }

    /// Whether the current traversal follows the edge's canonical direction.
    #[inline]
    pub fn forward(&self) -> bool {
        if self.is_mirror_record() {
            !self.forward_raw
        } else {
            self.forward_raw
        }
    }

    /// The vertex the current traversal leaves from.
    pub fn tail(&self) -> VertexId {
        match self.record.as_ref() {
            Some(record) if self.forward_raw => record.vertex1,
            Some(record) => record.vertex2,
            None => VertexId::EMPTY,
        }
    }

    /// The vertex the current traversal arrives at.
    pub fn head(&self) -> VertexId {
        match self.record.as_ref() {
            Some(record) if self.forward_raw => record.vertex2,
            Some(record) => record.vertex1,
            None => VertexId::EMPTY,
        }
    }

    /// The stored edge length in centimetres.
    #[inline]
    pub fn length_cm(&self) -> Option<u32> {
        self.record.as_ref().and_then(|record| record.length_cm)
    }

    /// The edge's type id under the network's edge-type index.
    ///
    /// Compare [`TileEntry::edge_type_generation`](crate::TileEntry::edge_type_generation)
    /// against the index generation before comparing ids across tiles.
    #[inline]
    pub fn edge_type_id(&self) -> Option<u32> {
        self.record.as_ref().and_then(|record| record.edge_type_id)
    }

    /// The decoded attribute bag of the current edge.
    pub fn attributes(&self) -> Vec<(String, String)> {
        match (self.tile, self.record.as_ref()) {
            (Some(tile), Some(record)) => record
                .attribute_pointer
                .map(|pointer| tile.attributes_at(pointer))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// The full geometry of the current edge (endpoints included), oriented
    /// along the traversal direction.
    ///
    /// Returns `None` when unpositioned or when an endpoint's tile is not
    /// loaded.
    pub fn shape(&self) -> Option<Vec<Coord<f64>>> {
        let tile = self.tile?;
        let record = self.record.as_ref()?;
        let from = self.network.vertex(record.vertex1)?;
        let to = self.network.vertex(record.vertex2)?;

        let mut points = Vec::new();
        points.push(from);
        if let Some(pointer) = record.shape_pointer {
            points.extend(tile.shape_at(pointer));
        }
        points.push(to);
        if !self.forward_raw {
            points.reverse();
        }
        Some(points)
    }

    /// The turn-cost tables at the tail vertex (where a turn onto this edge
    /// happens).
    pub fn tail_turn_cost_tables(&self) -> Vec<TurnCostTable> {
        let tail = self.tail();
        self.network
            .tile(tail.tile_id)
            .map(|tile| tile.turn_cost_tables(tail.local_id))
            .unwrap_or_default()
    }
}

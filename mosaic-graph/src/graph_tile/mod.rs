//! # Graph tiles
//!
//! A tile owns every vertex whose coordinate falls inside its bounds, the
//! edge records anchored at those vertices, and the byte arenas those
//! records point into (shapes, attribute bags, interned strings, turn-cost
//! tables). All public operations are either read-only (safe to share
//! across readers) or append-only (callable only through the unique writer
//! or mutator).

mod edge_record;
mod turn_costs;

pub(crate) use edge_record::{EdgeRecord, NewEdgeRecord};
pub use turn_costs::TurnCostTable;

use crate::attribute_index::AttributeSetIndex;
use crate::tiling::{self, COORDINATE_AXIS_BYTES, COORDINATE_BYTES};
use crate::{EdgeId, GraphError, VertexId, codec};
use geo::{Coord, Rect, coord};
use std::collections::HashMap;

/// Sentinel for "no record" in the dense head-pointer arrays.
pub(crate) const NULL_POINTER: u32 = u32::MAX;

/// Shape coordinates are delta-encoded at this precision.
const SHAPE_PRECISION: f64 = 1e6;

#[inline]
#[allow(clippy::cast_sign_loss)]
fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
#[allow(clippy::cast_possible_wrap)]
fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// One tile of the routing graph.
///
/// Tiles are plain values; cloning one copies all of its arenas, which is
/// what the copy-on-write mutator relies on.
#[derive(Clone, Debug)]
pub struct GraphTile {
    pub(crate) zoom: u8,
    pub(crate) tile_id: u32,
    pub(crate) bounds: Rect<f64>,
    pub(crate) next_vertex_id: u32,
    pub(crate) next_edge_id: u32,
    pub(crate) next_edge_pointer: u32,
    pub(crate) next_shape_pointer: u32,
    pub(crate) next_attribute_pointer: u32,
    pub(crate) next_string_id: u32,
    pub(crate) next_string_pointer: u32,
    pub(crate) next_turn_cost_pointer: u32,
    /// Per-vertex head pointer into the edges arena.
    pub(crate) pointers: Vec<u32>,
    /// Canonical local edge id -> byte offset of its record.
    pub(crate) edge_index: Vec<u32>,
    pub(crate) edges: Vec<u8>,
    /// Two 24-bit little-endian grid cells per vertex.
    pub(crate) coordinates: Vec<u8>,
    pub(crate) shapes: Vec<u8>,
    pub(crate) attributes: Vec<u8>,
    pub(crate) strings: Vec<u8>,
    /// String id -> byte offset of its length-prefixed payload.
    pub(crate) string_index: Vec<u32>,
    pub(crate) string_lookup: HashMap<String, u32>,
    /// Per-vertex head pointer into the turn-cost arena.
    pub(crate) turn_cost_pointers: Vec<u32>,
    pub(crate) turn_costs: Vec<u8>,
}

impl GraphTile {
    pub fn new(zoom: u8, tile_id: u32) -> Self {
        Self {
            zoom,
            tile_id,
            bounds: tiling::tile_bounds(tile_id, zoom),
            next_vertex_id: 0,
            next_edge_id: 0,
            next_edge_pointer: 0,
            next_shape_pointer: 0,
            next_attribute_pointer: 0,
            next_string_id: 0,
            next_string_pointer: 0,
            next_turn_cost_pointer: 0,
            pointers: Vec::new(),
            edge_index: Vec::new(),
            edges: Vec::new(),
            coordinates: Vec::new(),
            shapes: Vec::new(),
            attributes: Vec::new(),
            strings: Vec::new(),
            string_index: Vec::new(),
            string_lookup: HashMap::new(),
            turn_cost_pointers: Vec::new(),
            turn_costs: Vec::new(),
        }
    }

    #[inline]
    pub fn tile_id(&self) -> u32 {
        self.tile_id
    }

    #[inline]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.next_vertex_id
    }

    /// The number of canonical edges (mirror records not included).
    #[inline]
    pub fn edge_count(&self) -> u32 {
        self.next_edge_id
    }

    /// Adds a vertex at the given coordinate, quantized to the tile grid.
    pub fn add_vertex(&mut self, lon: f64, lat: f64) -> VertexId {
        let cells = tiling::quantize(&self.bounds, coord! { x: lon, y: lat });
        let pos = self.next_vertex_id as usize * COORDINATE_BYTES;
        codec::write_fixed(
            &mut self.coordinates,
            pos,
            COORDINATE_AXIS_BYTES,
            u64::from(cells.0),
        );
        codec::write_fixed(
            &mut self.coordinates,
            pos + COORDINATE_AXIS_BYTES,
            COORDINATE_AXIS_BYTES,
            u64::from(cells.1),
        );
        self.pointers.push(NULL_POINTER);
        self.turn_cost_pointers.push(NULL_POINTER);

        let id = VertexId::new(self.tile_id, self.next_vertex_id);
        self.next_vertex_id += 1;
        id
    }

    /// The coordinate of a vertex, or `None` if the id does not refer to a
    /// vertex of this tile.
    #[allow(clippy::cast_possible_truncation)]
    pub fn try_get_vertex(&self, vertex: VertexId) -> Option<Coord<f64>> {
        if vertex.tile_id != self.tile_id || vertex.local_id >= self.next_vertex_id {
            return None;
        }
        let pos = vertex.local_id as usize * COORDINATE_BYTES;
        let x = codec::read_fixed(&self.coordinates, pos, COORDINATE_AXIS_BYTES) as u32;
        let y = codec::read_fixed(
            &self.coordinates,
            pos + COORDINATE_AXIS_BYTES,
            COORDINATE_AXIS_BYTES,
        ) as u32;
        Some(tiling::dequantize(&self.bounds, (x, y)))
    }

    /// Adds an edge record to this tile.
    ///
    /// When `vertex1` belongs to this tile, a fresh canonical id is
    /// allocated for the edge (and `edge_id` must not be supplied).
    /// Otherwise this is the mirror record of an edge canonically owned by
    /// `vertex1`'s tile: `edge_id` must carry the canonical id, the
    /// endpoints are stored swapped so the locally resident endpoint comes
    /// first, and the shape is stored reversed to match.
    ///
    /// The shape covers the interior of the edge only (endpoints are
    /// implied by the vertices), oriented `vertex1` -> `vertex2` as passed.
    ///
    /// # Errors
    ///
    /// - [`GraphError::InvalidArgument`] if neither endpoint is resident in
    ///   this tile, a mirror record is missing its canonical id, or a
    ///   canonical record supplies one.
    /// - [`GraphError::NotFound`] if a resident endpoint does not exist.
    pub fn add_edge(
        &mut self,
        vertex1: VertexId,
        vertex2: VertexId,
        shape: &[Coord<f64>],
        attributes: &[(String, String)],
        edge_id: Option<EdgeId>,
        edge_type_id: Option<u32>,
        length_cm: Option<u32>,
    ) -> Result<EdgeId, GraphError> {
        let mirror = vertex1.tile_id != self.tile_id;
        if mirror && vertex2.tile_id != self.tile_id {
            return Err(GraphError::InvalidArgument(format!(
                "edge {vertex1} -> {vertex2} has no endpoint in tile {}",
                self.tile_id
            )));
        }

        let canonical = if mirror {
            let Some(canonical) = edge_id else {
                return Err(GraphError::InvalidArgument(format!(
                    "mirror record for {vertex1} -> {vertex2} requires the canonical edge id"
                )));
            };
            Some(canonical)
        } else {
            if edge_id.is_some() {
                return Err(GraphError::InvalidArgument(
                    "canonical edge ids are allocated by the tile".to_string(),
                ));
            }
            None
        };

        // The locally resident endpoint always comes first in the record.
        let (v1, v2) = if mirror {
            (vertex2, vertex1)
        } else {
            (vertex1, vertex2)
        };
        for vertex in [v1, v2] {
            if vertex.tile_id == self.tile_id && vertex.local_id >= self.next_vertex_id {
                return Err(GraphError::NotFound(format!("vertex {vertex}")));
            }
        }

        let shape_pointer = if shape.is_empty() {
            None
        } else {
            Some(self.append_shape(shape, mirror))
        };
        let attribute_pointer = if attributes.is_empty() {
            None
        } else {
            Some(self.append_attributes(attributes))
        };

        let offset = self.next_edge_pointer;
        let previous1 = self.head_pointer(v1.local_id);
        let previous2 = if v2.tile_id == self.tile_id && v2 != v1 {
            self.head_pointer(v2.local_id)
        } else {
            None
        };

        let cross = v1.tile_id != v2.tile_id;
        let result = if mirror {
            EdgeId::new(self.tile_id, EdgeId::MIN_CROSS_ID + offset)
        } else {
            EdgeId::new(self.tile_id, self.next_edge_id)
        };
        let record = NewEdgeRecord {
            vertex1: v1,
            vertex2: v2,
            previous1,
            previous2,
            canonical: if cross {
                canonical.or(Some(result))
            } else {
                None
            },
            edge_type_id,
            length_cm,
            shape_pointer,
            attribute_pointer,
        };

        let size = edge_record::write_record(&mut self.edges, offset as usize, self.tile_id, &record);
        #[allow(clippy::cast_possible_truncation)]
        {
            self.next_edge_pointer = offset + size as u32;
        }

        self.pointers[v1.local_id as usize] = offset;
        if v2.tile_id == self.tile_id && v2 != v1 {
            self.pointers[v2.local_id as usize] = offset;
        }
        if !mirror {
            self.edge_index.push(offset);
            self.next_edge_id += 1;
        }

        Ok(result)
    }

    /// Appends a turn-cost table for the given vertex.
    ///
    /// `costs` is a row-major matrix over `edges`; its length must be the
    /// square of the edge count.
    ///
    /// # Errors
    ///
    /// - [`GraphError::NotFound`] if the vertex does not exist in this tile.
    /// - [`GraphError::InvalidArgument`] if the matrix dimensions do not
    ///   match the edge list.
    pub fn add_turn_costs(
        &mut self,
        vertex: VertexId,
        turn_cost_type: u32,
        edges: &[EdgeId],
        costs: &[u32],
    ) -> Result<(), GraphError> {
        if vertex.tile_id != self.tile_id || vertex.local_id >= self.next_vertex_id {
            return Err(GraphError::NotFound(format!("vertex {vertex}")));
        }
        if costs.len() != edges.len() * edges.len() {
            return Err(GraphError::InvalidArgument(format!(
                "expected {} costs for {} edges, got {}",
                edges.len() * edges.len(),
                edges.len(),
                costs.len()
            )));
        }

        let local = vertex.local_id as usize;
        let previous = match self.turn_cost_pointers[local] {
            NULL_POINTER => None,
            pointer => Some(pointer),
        };

        let offset = self.next_turn_cost_pointer;
        let size = turn_costs::write_table(
            &mut self.turn_costs,
            offset as usize,
            previous,
            turn_cost_type,
            edges,
            costs,
        );
        #[allow(clippy::cast_possible_truncation)]
        {
            self.next_turn_cost_pointer = offset + size as u32;
        }
        self.turn_cost_pointers[local] = offset;
        Ok(())
    }

    /// All turn-cost tables attached to a vertex, newest first.
    pub fn turn_cost_tables(&self, local_id: u32) -> Vec<TurnCostTable> {
        let mut tables = Vec::new();
        let mut next = match self.turn_cost_pointers.get(local_id as usize) {
            Some(&NULL_POINTER) | None => None,
            Some(&pointer) => Some(pointer),
        };
        while let Some(offset) = next {
            let (table, previous) = turn_costs::read_table(&self.turn_costs, offset);
            tables.push(table);
            next = previous;
        }
        tables
    }

    /// Produces a rewritten tile in which every edge's type id is the result
    /// of classifying its attribute bag through the given index.
    ///
    /// The edges arena is rebuilt record by record (head pointers and the
    /// id index recomputed); the remaining arenas carry over unchanged.
    pub fn apply_edge_type_fn(&self, index: &AttributeSetIndex) -> GraphTile {
        let mut out = self.clone();
        out.edges = Vec::new();
        out.edge_index = Vec::new();
        out.next_edge_pointer = 0;

        let mut remap: HashMap<u32, u32> = HashMap::new();
        let mut pos = 0u32;
        while pos < self.next_edge_pointer {
            let record = self.record_at(pos);
            let bag = record
                .attribute_pointer
                .map(|pointer| self.attributes_at(pointer))
                .unwrap_or_default();
            let new_type = index.get(&bag);

            let new_offset = out.next_edge_pointer;
            let rewritten = NewEdgeRecord {
                vertex1: record.vertex1,
                vertex2: record.vertex2,
                previous1: record.previous1.map(|p| remap.get(&p).copied().unwrap_or(p)),
                previous2: record.previous2.map(|p| remap.get(&p).copied().unwrap_or(p)),
                canonical: record.canonical,
                edge_type_id: Some(new_type),
                length_cm: record.length_cm,
                shape_pointer: record.shape_pointer,
                attribute_pointer: record.attribute_pointer,
            };
            let size = edge_record::write_record(
                &mut out.edges,
                new_offset as usize,
                self.tile_id,
                &rewritten,
            );
            #[allow(clippy::cast_possible_truncation)]
            {
                out.next_edge_pointer = new_offset + size as u32;
            }
            remap.insert(pos, new_offset);

            // Canonical records (same-tile, or cross-tile owned here) keep
            // their position in the id index; mirrors have no index entry.
            if record
                .canonical
                .is_none_or(|canonical| canonical.tile_id == self.tile_id)
            {
                out.edge_index.push(new_offset);
            }

            pos += record.size;
        }

        for (local, head) in self.pointers.iter().enumerate() {
            out.pointers[local] = match *head {
                NULL_POINTER => NULL_POINTER,
                head => remap.get(&head).copied().unwrap_or(head),
            };
        }

        tracing::debug!(
            tile_id = self.tile_id,
            generation = index.generation(),
            "rewrote edge types"
        );
        out
    }

    // Record-level accessors shared with the enumerator and serializer.

    pub(crate) fn head_pointer(&self, local_id: u32) -> Option<u32> {
        match self.pointers.get(local_id as usize) {
            Some(&NULL_POINTER) | None => None,
            Some(&pointer) => Some(pointer),
        }
    }

    pub(crate) fn record_at(&self, offset: u32) -> EdgeRecord {
        edge_record::read_record(&self.edges, offset, self.tile_id)
    }

    /// The byte offset of the record addressed by an edge id, if present.
    pub(crate) fn offset_for(&self, edge: EdgeId) -> Option<u32> {
        if edge.tile_id != self.tile_id {
            return None;
        }
        if edge.is_mirror() {
            let offset = edge.local_id - EdgeId::MIN_CROSS_ID;
            (offset < self.next_edge_pointer).then_some(offset)
        } else {
            self.edge_index.get(edge.local_id as usize).copied()
        }
    }

    /// The canonical local id of the record at the given offset, if the
    /// record is canonical.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn local_id_for_offset(&self, offset: u32) -> Option<u32> {
        let index = self.edge_index.partition_point(|&o| o < offset);
        (self.edge_index.get(index).copied() == Some(offset)).then_some(index as u32)
    }

    /// Sequentially decodes every record in the edges arena.
    pub(crate) fn records(&self) -> impl Iterator<Item = EdgeRecord> + '_ {
        let mut pos = 0u32;
        std::iter::from_fn(move || {
            if pos >= self.next_edge_pointer {
                return None;
            }
            let record = self.record_at(pos);
            pos += record.size;
            Some(record)
        })
    }

    // Shape arena.

    #[allow(clippy::cast_possible_truncation)]
    fn append_shape(&mut self, shape: &[Coord<f64>], reverse: bool) -> u32 {
        let pointer = self.next_shape_pointer;
        let mut p = pointer as usize;
        p += codec::write_varuint(&mut self.shapes, p, shape.len() as u64);

        let points: Vec<Coord<f64>> = if reverse {
            shape.iter().rev().copied().collect()
        } else {
            shape.to_vec()
        };
        let mut previous_lon = 0i64;
        let mut previous_lat = 0i64;
        for point in points {
            let lon = (point.x * SHAPE_PRECISION).round() as i64;
            let lat = (point.y * SHAPE_PRECISION).round() as i64;
            p += codec::write_varuint(&mut self.shapes, p, zigzag(lon - previous_lon));
            p += codec::write_varuint(&mut self.shapes, p, zigzag(lat - previous_lat));
            previous_lon = lon;
            previous_lat = lat;
        }

        self.next_shape_pointer = p as u32;
        pointer
    }

    /// Decodes the shape stored at the given arena pointer.
    #[allow(clippy::cast_precision_loss)]
    pub fn shape_at(&self, pointer: u32) -> Vec<Coord<f64>> {
        let mut p = pointer as usize;
        let (count, size) = codec::read_varuint(&self.shapes, p);
        p += size;

        let mut points = Vec::with_capacity(count as usize);
        let mut lon = 0i64;
        let mut lat = 0i64;
        for _ in 0..count {
            let (raw, size) = codec::read_varuint(&self.shapes, p);
            p += size;
            lon += unzigzag(raw);
            let (raw, size) = codec::read_varuint(&self.shapes, p);
            p += size;
            lat += unzigzag(raw);
            points.push(coord! {
                x: lon as f64 / SHAPE_PRECISION,
                y: lat as f64 / SHAPE_PRECISION,
            });
        }
        points
    }

    // String and attribute arenas.

    #[allow(clippy::cast_possible_truncation)]
    fn intern_string(&mut self, value: &str) -> u32 {
        if let Some(id) = self.string_lookup.get(value) {
            return *id;
        }

        let id = self.next_string_id;
        let pointer = self.next_string_pointer;
        let mut p = pointer as usize;
        p += codec::write_varuint(&mut self.strings, p, value.len() as u64);
        p += codec::write_bytes(&mut self.strings, p, value.as_bytes());

        self.string_index.push(pointer);
        self.string_lookup.insert(value.to_string(), id);
        self.next_string_id += 1;
        self.next_string_pointer = p as u32;
        id
    }

    pub(crate) fn string_at(&self, id: u32) -> Option<&str> {
        let pointer = *self.string_index.get(id as usize)? as usize;
        let (length, size) = codec::read_varuint(&self.strings, pointer);
        let start = pointer + size;
        std::str::from_utf8(&self.strings[start..start + length as usize]).ok()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn append_attributes(&mut self, attributes: &[(String, String)]) -> u32 {
        let pointer = self.next_attribute_pointer;
        let mut p = pointer as usize;
        p += codec::write_varuint(&mut self.attributes, p, attributes.len() as u64);
        for (key, value) in attributes {
            let key_id = self.intern_string(key);
            p += codec::write_varuint(&mut self.attributes, p, u64::from(key_id));
            let value_id = self.intern_string(value);
            p += codec::write_varuint(&mut self.attributes, p, u64::from(value_id));
        }
        self.next_attribute_pointer = p as u32;
        pointer
    }

    /// Decodes the attribute bag stored at the given arena pointer.
    #[allow(clippy::cast_possible_truncation)]
    pub fn attributes_at(&self, pointer: u32) -> Vec<(String, String)> {
        let mut p = pointer as usize;
        let (count, size) = codec::read_varuint(&self.attributes, p);
        p += size;

        let mut bag = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (key_id, size) = codec::read_varuint(&self.attributes, p);
            p += size;
            let (value_id, size) = codec::read_varuint(&self.attributes, p);
            p += size;
            bag.push((
                self.string_at(key_id as u32).unwrap_or("").to_string(),
                self.string_at(value_id as u32).unwrap_or("").to_string(),
            ));
        }
        bag
    }

    /// Rebuilds the string intern lookup from the arenas (used after
    /// deserialization).
    pub(crate) fn rebuild_string_lookup(&mut self) {
        self.string_lookup = (0..self.next_string_id)
            .filter_map(|id| self.string_at(id).map(|s| (s.to_string(), id)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const TEST_ZOOM: u8 = 14;
    // The tile containing (0.0005, 0.0005) at zoom 14.
    const TEST_TILE: u32 = 8191 * 16384 + 8192;

    fn tile() -> GraphTile {
        GraphTile::new(TEST_ZOOM, TEST_TILE)
    }

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    /// Walks the adjacency chain of a vertex, returning record offsets.
    fn chain(tile: &GraphTile, vertex: VertexId) -> Vec<u32> {
        let mut offsets = Vec::new();
        let mut next = tile.head_pointer(vertex.local_id);
        while let Some(offset) = next {
            let record = tile.record_at(offset);
            offsets.push(offset);
            next = record.previous_for(vertex);
        }
        offsets
    }

    #[test]
    fn test_add_vertex_round_trip() {
        let mut tile = tile();
        let vertex = tile.add_vertex(0.000_4, 0.000_6);
        assert_eq!(vertex, VertexId::new(TEST_TILE, 0));

        let coordinate = tile.try_get_vertex(vertex).expect("vertex should exist");
        assert!((coordinate.x - 0.000_4).abs() < 1e-5);
        assert!((coordinate.y - 0.000_6).abs() < 1e-5);

        assert_eq!(tile.try_get_vertex(VertexId::new(TEST_TILE, 1)), None);
        assert_eq!(tile.try_get_vertex(VertexId::new(TEST_TILE + 1, 0)), None);
    }

    #[test]
    fn test_adjacency_chain_is_complete() {
        let mut tile = tile();
        let a = tile.add_vertex(0.000_1, 0.000_1);
        let b = tile.add_vertex(0.000_2, 0.000_2);
        let c = tile.add_vertex(0.000_3, 0.000_1);

        let ab = tile.add_edge(a, b, &[], &[], None, None, None).unwrap();
        let bc = tile.add_edge(b, c, &[], &[], None, None, None).unwrap();
        let ca = tile.add_edge(c, a, &[], &[], None, None, None).unwrap();
        let ab2 = tile.add_edge(a, b, &[], &[], None, None, None).unwrap();

        assert_eq!(ab, EdgeId::new(TEST_TILE, 0));
        assert_eq!(bc, EdgeId::new(TEST_TILE, 1));
        assert_eq!(ca, EdgeId::new(TEST_TILE, 2));
        assert_eq!(ab2, EdgeId::new(TEST_TILE, 3));

        // Each vertex's chain lists exactly the records naming it, once.
        for (vertex, expected) in [
            (a, vec![ab, ca, ab2]),
            (b, vec![ab, bc, ab2]),
            (c, vec![bc, ca]),
        ] {
            let offsets: HashSet<u32> = chain(&tile, vertex).into_iter().collect();
            let expected: HashSet<u32> = expected
                .iter()
                .map(|edge| tile.offset_for(*edge).unwrap())
                .collect();
            assert_eq!(offsets, expected, "chain mismatch for {vertex}");
        }
    }

    #[test]
    fn test_edge_payload_round_trip() {
        let mut tile = tile();
        let a = tile.add_vertex(0.000_1, 0.000_1);
        let b = tile.add_vertex(0.000_9, 0.000_9);

        let shape = [coord! { x: 0.000_4, y: 0.000_2 }];
        let attributes = [pair("highway", "residential"), pair("name", "Rua A")];
        let edge = tile
            .add_edge(a, b, &shape, &attributes, None, Some(7), Some(12_345))
            .unwrap();

        let record = tile.record_at(tile.offset_for(edge).unwrap());
        assert_eq!(record.edge_type_id, Some(7));
        assert_eq!(record.length_cm, Some(12_345));
        assert_eq!(record.canonical, None);

        let decoded_shape = tile.shape_at(record.shape_pointer.unwrap());
        assert_eq!(decoded_shape.len(), 1);
        assert!((decoded_shape[0].x - 0.000_4).abs() < 1e-6);
        assert!((decoded_shape[0].y - 0.000_2).abs() < 1e-6);

        let decoded_attributes = tile.attributes_at(record.attribute_pointer.unwrap());
        assert_eq!(decoded_attributes, attributes.to_vec());
    }

    #[test]
    fn test_string_interning_dedupes() {
        let mut tile = tile();
        let a = tile.add_vertex(0.000_1, 0.000_1);
        let b = tile.add_vertex(0.000_2, 0.000_2);

        tile.add_edge(a, b, &[], &[pair("highway", "residential")], None, None, None)
            .unwrap();
        tile.add_edge(b, a, &[], &[pair("highway", "primary")], None, None, None)
            .unwrap();

        // "highway" is shared; three distinct strings total.
        assert_eq!(tile.next_string_id, 3);
    }

    #[test]
    fn test_mirror_record_requires_canonical_id() {
        let mut tile = tile();
        let local = tile.add_vertex(0.000_1, 0.000_1);
        let remote = VertexId::new(TEST_TILE + 1, 0);

        let result = tile.add_edge(remote, local, &[], &[], None, None, None);
        assert!(matches!(result, Err(GraphError::InvalidArgument(_))));
    }

    #[test]
    fn test_mirror_record_swaps_and_reverses() {
        let mut tile = tile();
        let local = tile.add_vertex(0.000_1, 0.000_1);
        let remote = VertexId::new(TEST_TILE + 1, 3);
        let canonical = EdgeId::new(TEST_TILE + 1, 0);

        let shape = [
            coord! { x: 0.001, y: 0.0 },
            coord! { x: 0.002, y: 0.0 },
        ];
        let mirror = tile
            .add_edge(remote, local, &shape, &[], Some(canonical), None, Some(100))
            .unwrap();
        assert!(mirror.is_mirror());

        let record = tile.record_at(tile.offset_for(mirror).unwrap());
        assert_eq!(record.vertex1, local);
        assert_eq!(record.vertex2, remote);
        assert_eq!(record.canonical, Some(canonical));

        // Shape is stored in record orientation, i.e. reversed.
        let decoded = tile.shape_at(record.shape_pointer.unwrap());
        assert!((decoded[0].x - 0.002).abs() < 1e-6);
        assert!((decoded[1].x - 0.001).abs() < 1e-6);

        // Mirrors are not canonical edges.
        assert_eq!(tile.edge_count(), 0);
    }

    #[test]
    fn test_turn_cost_chain() {
        let mut tile = tile();
        let a = tile.add_vertex(0.000_1, 0.000_1);
        let b = tile.add_vertex(0.000_2, 0.000_2);
        let ab = tile.add_edge(a, b, &[], &[], None, None, None).unwrap();
        let ba = tile.add_edge(b, a, &[], &[], None, None, None).unwrap();

        tile.add_turn_costs(b, 0, &[ab, ba], &[0, 4, 4, 0]).unwrap();
        tile.add_turn_costs(b, 1, &[ab, ba], &[0, 9, 9, 0]).unwrap();

        let tables = tile.turn_cost_tables(b.local_id);
        assert_eq!(tables.len(), 2);
        // Newest first.
        assert_eq!(tables[0].turn_cost_type, 1);
        assert_eq!(tables[1].cost_between(ab, ba), Some(4));

        assert!(tile.turn_cost_tables(a.local_id).is_empty());

        let bad = tile.add_turn_costs(b, 0, &[ab, ba], &[1, 2, 3]);
        assert!(matches!(bad, Err(GraphError::InvalidArgument(_))));
    }

    #[test]
    fn test_apply_edge_type_fn_rewrites_every_record() {
        use crate::attribute_index::AttributeSetIndex;
        use std::sync::Arc;

        let mut tile = tile();
        let a = tile.add_vertex(0.000_1, 0.000_1);
        let b = tile.add_vertex(0.000_2, 0.000_2);
        let c = tile.add_vertex(0.000_3, 0.000_3);
        tile.add_edge(a, b, &[], &[pair("highway", "residential"), pair("name", "X")], None, Some(0), None)
            .unwrap();
        tile.add_edge(b, c, &[], &[pair("highway", "primary")], None, Some(1), None)
            .unwrap();

        // Classify by the "highway" key only.
        let index = AttributeSetIndex::new(Arc::new(|bag: &[(String, String)]| {
            bag.iter()
                .filter(|(key, _)| key == "highway")
                .cloned()
                .collect()
        }));

        let rewritten = tile.apply_edge_type_fn(&index);
        assert_eq!(rewritten.edge_count(), 2);

        let types: Vec<Option<u32>> = rewritten.records().map(|r| r.edge_type_id).collect();
        assert_eq!(types.len(), 2);
        assert_ne!(types[0], types[1]);

        // Adjacency survives the rewrite.
        let offsets = chain(&rewritten, b);
        assert_eq!(offsets.len(), 2);

        // Attribute payloads are untouched.
        let record = rewritten.record_at(rewritten.offset_for(EdgeId::new(TEST_TILE, 0)).unwrap());
        assert_eq!(
            rewritten.attributes_at(record.attribute_pointer.unwrap()),
            vec![pair("highway", "residential"), pair("name", "X")]
        );
    }
}

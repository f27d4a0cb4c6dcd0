//! Edge record packing.
//!
//! Edge records are appended to a tile's edges arena and chained per vertex:
//! a dense head-pointer array gives the byte offset of the most recently
//! added record for each vertex, and each record carries a "previous record"
//! pointer per endpoint. Walking a vertex's chain visits every record that
//! lists the vertex, newest first.
//!
//! Record layout, all fields varint:
//!
//! 1. vertex 1 reference
//! 2. vertex 2 reference
//! 3. previous-record pointer for vertex 1 (nullable)
//! 4. previous-record pointer for vertex 2 (nullable)
//! 5. canonical edge id, present only when the endpoints are in different
//!    tiles
//! 6. edge type id (nullable)
//! 7. length in centimetres (nullable)
//! 8. shape arena pointer (nullable)
//! 9. attribute arena pointer (nullable)
//!
//! A vertex reference is `local_id << 1` for an endpoint resident in this
//! tile and `(encoded_id << 1) | 1` for a cross-tile endpoint. The tag bit
//! keeps decoding exact for every tile, including tile 0, where a bare
//! encoded id would be indistinguishable from a local one.

use crate::codec;
use crate::{EdgeId, VertexId};

/// A fully decoded edge record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EdgeRecord {
    /// Byte offset of this record in the edges arena.
    pub offset: u32,
    /// Encoded size in bytes.
    pub size: u32,
    pub vertex1: VertexId,
    pub vertex2: VertexId,
    pub previous1: Option<u32>,
    pub previous2: Option<u32>,
    /// The canonical edge id; present only on cross-tile records.
    pub canonical: Option<EdgeId>,
    pub edge_type_id: Option<u32>,
    pub length_cm: Option<u32>,
    pub shape_pointer: Option<u32>,
    pub attribute_pointer: Option<u32>,
}

impl EdgeRecord {
    /// The previous-record pointer for the chain of the given vertex.
    pub fn previous_for(&self, vertex: VertexId) -> Option<u32> {
        if vertex == self.vertex1 {
            self.previous1
        } else {
            self.previous2
        }
    }
}

/// The fields of a record about to be written.
pub(crate) struct NewEdgeRecord {
    pub vertex1: VertexId,
    pub vertex2: VertexId,
    pub previous1: Option<u32>,
    pub previous2: Option<u32>,
    /// Must be set when `vertex1` and `vertex2` are in different tiles.
    pub canonical: Option<EdgeId>,
    pub edge_type_id: Option<u32>,
    pub length_cm: Option<u32>,
    pub shape_pointer: Option<u32>,
    pub attribute_pointer: Option<u32>,
}

fn encode_vertex_ref(tile_id: u32, vertex: VertexId) -> u64 {
    if vertex.tile_id == tile_id {
        u64::from(vertex.local_id) << 1
    } else {
        (vertex.encode() << 1) | 1
    }
}

#[allow(clippy::cast_possible_truncation)]
fn decode_vertex_ref(tile_id: u32, raw: u64) -> VertexId {
    if raw & 1 == 0 {
        VertexId::new(tile_id, (raw >> 1) as u32)
    } else {
        VertexId::decode(raw >> 1)
    }
}

/// Writes a record at `pos`, returning its encoded size.
pub(crate) fn write_record(
    buf: &mut Vec<u8>,
    pos: usize,
    tile_id: u32,
    record: &NewEdgeRecord,
) -> usize {
    let mut p = pos;
    p += codec::write_varuint(buf, p, encode_vertex_ref(tile_id, record.vertex1));
    p += codec::write_varuint(buf, p, encode_vertex_ref(tile_id, record.vertex2));
    p += codec::write_varuint_nullable(buf, p, record.previous1.map(u64::from));
    p += codec::write_varuint_nullable(buf, p, record.previous2.map(u64::from));
    if record.vertex1.tile_id != record.vertex2.tile_id {
        let canonical = record.canonical.unwrap_or(EdgeId::EMPTY);
        debug_assert!(!canonical.is_empty());
        p += codec::write_varuint(buf, p, canonical.encode());
    }
    p += codec::write_varuint_nullable(buf, p, record.edge_type_id.map(u64::from));
    p += codec::write_varuint_nullable(buf, p, record.length_cm.map(u64::from));
    p += codec::write_varuint_nullable(buf, p, record.shape_pointer.map(u64::from));
    p += codec::write_varuint_nullable(buf, p, record.attribute_pointer.map(u64::from));
    p - pos
}

/// Decodes the record at the given byte offset.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn read_record(buf: &[u8], offset: u32, tile_id: u32) -> EdgeRecord {
    let start = offset as usize;
    let mut p = start;

    let (raw, size) = codec::read_varuint(buf, p);
    p += size;
    let vertex1 = decode_vertex_ref(tile_id, raw);

    let (raw, size) = codec::read_varuint(buf, p);
    p += size;
    let vertex2 = decode_vertex_ref(tile_id, raw);

    let (previous1, size) = codec::read_varuint_nullable(buf, p);
    p += size;
    let (previous2, size) = codec::read_varuint_nullable(buf, p);
    p += size;

    let canonical = if vertex1.tile_id == vertex2.tile_id {
        None
    } else {
        let (raw, size) = codec::read_varuint(buf, p);
        p += size;
        Some(EdgeId::decode(raw))
    };

    let (edge_type_id, size) = codec::read_varuint_nullable(buf, p);
    p += size;
    let (length_cm, size) = codec::read_varuint_nullable(buf, p);
    p += size;
    let (shape_pointer, size) = codec::read_varuint_nullable(buf, p);
    p += size;
    let (attribute_pointer, size) = codec::read_varuint_nullable(buf, p);
    p += size;

    EdgeRecord {
        offset,
        size: (p - start) as u32,
        vertex1,
        vertex2,
        previous1: previous1.map(|v| v as u32),
        previous2: previous2.map(|v| v as u32),
        canonical,
        edge_type_id: edge_type_id.map(|v| v as u32),
        length_cm: length_cm.map(|v| v as u32),
        shape_pointer: shape_pointer.map(|v| v as u32),
        attribute_pointer: attribute_pointer.map(|v| v as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_ref_tag_disambiguates_tile_zero() {
        // A local vertex in tile 0 and a cross-tile reference to tile 0
        // must not collide.
        let local = VertexId::new(0, 12);
        let cross = VertexId::new(0, 12);
        assert_ne!(encode_vertex_ref(0, local), encode_vertex_ref(7, cross));
        assert_eq!(decode_vertex_ref(0, encode_vertex_ref(0, local)), local);
        assert_eq!(decode_vertex_ref(7, encode_vertex_ref(7, cross)), cross);
    }

    #[test]
    fn test_record_round_trip() {
        let record = NewEdgeRecord {
            vertex1: VertexId::new(5, 0),
            vertex2: VertexId::new(5, 1),
            previous1: None,
            previous2: Some(0),
            canonical: None,
            edge_type_id: Some(3),
            length_cm: Some(123_456),
            shape_pointer: None,
            attribute_pointer: Some(0),
        };

        let mut buf = Vec::new();
        let size = write_record(&mut buf, 0, 5, &record);
        let decoded = read_record(&buf, 0, 5);

        assert_eq!(decoded.size as usize, size);
        assert_eq!(decoded.vertex1, record.vertex1);
        assert_eq!(decoded.vertex2, record.vertex2);
        assert_eq!(decoded.previous1, None);
        assert_eq!(decoded.previous2, Some(0));
        assert_eq!(decoded.canonical, None);
        assert_eq!(decoded.edge_type_id, Some(3));
        assert_eq!(decoded.length_cm, Some(123_456));
        assert_eq!(decoded.shape_pointer, None);
        assert_eq!(decoded.attribute_pointer, Some(0));
    }

    #[test]
    fn test_cross_tile_record_carries_canonical_id() {
        let canonical = EdgeId::new(5, 9);
        let record = NewEdgeRecord {
            vertex1: VertexId::new(5, 2),
            vertex2: VertexId::new(6, 0),
            previous1: None,
            previous2: None,
            canonical: Some(canonical),
            edge_type_id: None,
            length_cm: None,
            shape_pointer: None,
            attribute_pointer: None,
        };

        let mut buf = Vec::new();
        write_record(&mut buf, 0, 5, &record);
        let decoded = read_record(&buf, 0, 5);
        assert_eq!(decoded.canonical, Some(canonical));
        assert_eq!(decoded.vertex2, VertexId::new(6, 0));
    }
}

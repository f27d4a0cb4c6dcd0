//! # Persistence
//!
//! A versioned container frames, in order: a fixed header, every tile's
//! arenas, the two attribute-set index tables, and a metadata attribute
//! bag. Single tiles use the same framing minus the network envelope; that
//! per-tile container is what a
//! [`TileDataProvider`](crate::tile_provider::TileDataProvider) hands back.
//!
//! Loading is the trust boundary: every length and offset is checked here
//! and malformed input surfaces as [`GraphError::Corrupt`]. Once loaded,
//! in-memory tiles are trusted.
//!
//! Classification functions are code and do not persist; a loaded index
//! keeps its interned bags and generation, and callers re-install their
//! classifier through a mutator when needed.

use crate::attribute_index::AttributeSetIndex;
use crate::graph_tile::GraphTile;
use crate::network::{RoutingNetwork, TileEntry};
use crate::{GraphError, tiling};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::Arc;
use zerocopy::{FromBytes, IntoBytes, LE, U32};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// The container format version this build reads and writes.
pub const FORMAT_VERSION: u8 = 1;

const NETWORK_MAGIC: [u8; 4] = *b"MOSN";
const TILE_MAGIC: [u8; 4] = *b"MOST";

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct NetworkHeader {
    magic: [u8; 4],
    version: u8,
    zoom: u8,
    reserved: [u8; 2],
    tile_count: U32<LE>,
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct TileHeader {
    magic: [u8; 4],
    version: u8,
    zoom: u8,
    reserved: [u8; 2],
    tile_id: U32<LE>,
    edge_type_generation: U32<LE>,
    vertex_count: U32<LE>,
    edge_count: U32<LE>,
    string_count: U32<LE>,
    edges_size: U32<LE>,
    shapes_size: U32<LE>,
    attributes_size: U32<LE>,
    strings_size: U32<LE>,
    turn_costs_size: U32<LE>,
}

fn corrupt(what: &str) -> GraphError {
    GraphError::Corrupt(what.to_string())
}

/// A bounds-checked cursor over untrusted bytes.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], GraphError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| corrupt("truncated input"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, GraphError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> Result<String, GraphError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| corrupt("invalid UTF-8 string"))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

fn write_u32_slice(out: &mut Vec<u8>, values: &[u32]) {
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn read_u32_vec(reader: &mut Reader<'_>, count: usize) -> Result<Vec<u32>, GraphError> {
    (0..count).map(|_| reader.u32()).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn write_bag(out: &mut Vec<u8>, bag: &[(String, String)]) {
    out.extend_from_slice(&(bag.len() as u32).to_le_bytes());
    for (key, value) in bag {
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value.as_bytes());
    }
}

fn read_bag(reader: &mut Reader<'_>) -> Result<Vec<(String, String)>, GraphError> {
    let count = reader.u32()? as usize;
    let mut bag = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let key = reader.string()?;
        let value = reader.string()?;
        bag.push((key, value));
    }
    Ok(bag)
}

#[allow(clippy::cast_possible_truncation)]
fn write_index(out: &mut Vec<u8>, index: &AttributeSetIndex) {
    out.extend_from_slice(&index.generation().to_le_bytes());
    out.extend_from_slice(&index.len().to_le_bytes());
    for id in 0..index.len() {
        let bag = index.bag(id).unwrap_or_default();
        write_bag(out, &bag);
    }
}

fn read_index(reader: &mut Reader<'_>) -> Result<AttributeSetIndex, GraphError> {
    let generation = reader.u32()?;
    let count = reader.u32()? as usize;
    let bags = (0..count)
        .map(|_| read_bag(reader))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AttributeSetIndex::from_parts(bags, generation))
}

/// Serializes a single tile together with its classification generation.
#[allow(clippy::cast_possible_truncation)]
pub fn write_tile(tile: &GraphTile, edge_type_generation: u32) -> Vec<u8> {
    let header = TileHeader {
        magic: TILE_MAGIC,
        version: FORMAT_VERSION,
        zoom: tile.zoom,
        reserved: [0; 2],
        tile_id: U32::new(tile.tile_id),
        edge_type_generation: U32::new(edge_type_generation),
        vertex_count: U32::new(tile.next_vertex_id),
        edge_count: U32::new(tile.next_edge_id),
        string_count: U32::new(tile.next_string_id),
        edges_size: U32::new(tile.next_edge_pointer),
        shapes_size: U32::new(tile.next_shape_pointer),
        attributes_size: U32::new(tile.next_attribute_pointer),
        strings_size: U32::new(tile.next_string_pointer),
        turn_costs_size: U32::new(tile.next_turn_cost_pointer),
    };

    let mut out = header.as_bytes().to_vec();
    write_u32_slice(&mut out, &tile.pointers);
    write_u32_slice(&mut out, &tile.edge_index);
    write_u32_slice(&mut out, &tile.string_index);
    write_u32_slice(&mut out, &tile.turn_cost_pointers);
    out.extend_from_slice(&tile.coordinates[..tile.next_vertex_id as usize * 6]);
    out.extend_from_slice(&tile.edges[..tile.next_edge_pointer as usize]);
    out.extend_from_slice(&tile.shapes[..tile.next_shape_pointer as usize]);
    out.extend_from_slice(&tile.attributes[..tile.next_attribute_pointer as usize]);
    out.extend_from_slice(&tile.strings[..tile.next_string_pointer as usize]);
    out.extend_from_slice(&tile.turn_costs[..tile.next_turn_cost_pointer as usize]);
    out
}

/// Decodes a single-tile container, returning the tile and its
/// classification generation.
///
/// # Errors
///
/// [`GraphError::Corrupt`] for bad magic, an unsupported version, or
/// truncated sections.
pub fn read_tile(bytes: &[u8]) -> Result<(GraphTile, u32), GraphError> {
    let mut reader = Reader::new(bytes);
    let header_bytes = reader.take(size_of::<TileHeader>())?;
    let header =
        TileHeader::read_from_bytes(header_bytes).map_err(|_| corrupt("tile header size"))?;

    if header.magic != TILE_MAGIC {
        return Err(corrupt("bad tile magic"));
    }
    if header.version != FORMAT_VERSION {
        return Err(corrupt("unsupported tile format version"));
    }

    let vertex_count = header.vertex_count.get();
    let edge_count = header.edge_count.get();
    let string_count = header.string_count.get();

    let pointers = read_u32_vec(&mut reader, vertex_count as usize)?;
    let edge_index = read_u32_vec(&mut reader, edge_count as usize)?;
    let string_index = read_u32_vec(&mut reader, string_count as usize)?;
    let turn_cost_pointers = read_u32_vec(&mut reader, vertex_count as usize)?;
    let coordinates = reader.take(vertex_count as usize * 6)?.to_vec();
    let edges = reader.take(header.edges_size.get() as usize)?.to_vec();
    let shapes = reader.take(header.shapes_size.get() as usize)?.to_vec();
    let attributes = reader.take(header.attributes_size.get() as usize)?.to_vec();
    let strings = reader.take(header.strings_size.get() as usize)?.to_vec();
    let turn_costs = reader.take(header.turn_costs_size.get() as usize)?.to_vec();

    if reader.remaining() != 0 {
        return Err(corrupt("leftover bytes after the tile sections"));
    }

    let mut tile = GraphTile {
        zoom: header.zoom,
        tile_id: header.tile_id.get(),
        bounds: tiling::tile_bounds(header.tile_id.get(), header.zoom),
        next_vertex_id: vertex_count,
        next_edge_id: edge_count,
        next_edge_pointer: header.edges_size.get(),
        next_shape_pointer: header.shapes_size.get(),
        next_attribute_pointer: header.attributes_size.get(),
        next_string_id: string_count,
        next_string_pointer: header.strings_size.get(),
        next_turn_cost_pointer: header.turn_costs_size.get(),
        pointers,
        edge_index,
        edges,
        coordinates,
        shapes,
        attributes,
        strings,
        string_index,
        string_lookup: HashMap::new(),
        turn_cost_pointers,
        turn_costs,
    };
    tile.rebuild_string_lookup();
    Ok((tile, header.edge_type_generation.get()))
}

/// Persists a network and its metadata bag.
///
/// # Errors
///
/// Propagates I/O failures from the writer.
#[allow(clippy::cast_possible_truncation)]
pub fn write_network<W: Write>(
    network: &RoutingNetwork,
    metadata: &[(String, String)],
    mut writer: W,
) -> Result<(), GraphError> {
    let header = NetworkHeader {
        magic: NETWORK_MAGIC,
        version: FORMAT_VERSION,
        zoom: network.zoom,
        reserved: [0; 2],
        tile_count: U32::new(network.tiles.len() as u32),
    };
    writer.write_all(header.as_bytes())?;

    for entry in network.tiles.values() {
        let bytes = write_tile(&entry.tile, entry.edge_type_generation);
        writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
        writer.write_all(&bytes)?;
    }

    let mut tail = Vec::new();
    write_index(&mut tail, network.edge_types());
    write_index(&mut tail, network.turn_cost_types());
    write_bag(&mut tail, metadata);
    writer.write_all(&tail)?;
    Ok(())
}

/// Restores a network and its metadata bag.
///
/// # Errors
///
/// [`GraphError::Io`] for read failures; [`GraphError::Corrupt`] for
/// malformed input, including leftover bytes after the last section.
pub fn read_network<R: Read>(
    mut reader: R,
) -> Result<(RoutingNetwork, Vec<(String, String)>), GraphError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let mut reader = Reader::new(&buf);

    let header_bytes = reader.take(size_of::<NetworkHeader>())?;
    let header =
        NetworkHeader::read_from_bytes(header_bytes).map_err(|_| corrupt("network header size"))?;
    if header.magic != NETWORK_MAGIC {
        return Err(corrupt("bad network magic"));
    }
    if header.version != FORMAT_VERSION {
        return Err(corrupt("unsupported network format version"));
    }

    let mut tiles = BTreeMap::new();
    for _ in 0..header.tile_count.get() {
        let len = reader.u32()? as usize;
        let tile_bytes = reader.take(len)?;
        let (tile, edge_type_generation) = read_tile(tile_bytes)?;
        if tile.zoom() != header.zoom {
            return Err(corrupt("tile zoom does not match network zoom"));
        }
        tiles.insert(
            tile.tile_id(),
            TileEntry {
                tile: Arc::new(tile),
                edge_type_generation,
            },
        );
    }

    let edge_types = read_index(&mut reader)?;
    let turn_cost_types = read_index(&mut reader)?;
    let metadata = read_bag(&mut reader)?;

    if reader.remaining() != 0 {
        return Err(corrupt("leftover bytes after the metadata section"));
    }

    Ok((
        RoutingNetwork {
            zoom: header.zoom,
            tiles,
            edge_types: Arc::new(edge_types),
            turn_cost_types: Arc::new(turn_cost_types),
        },
        metadata,
    ))
}

use std::fmt::{Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An identifier of a vertex within the tiled graph.
///
/// Vertices are owned by exactly one tile (the tile whose bounds contain
/// their coordinate), and are identified by the pair of that tile's id and a
/// dense index within the tile.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct VertexId {
    /// The id of the tile which owns this vertex.
    pub tile_id: u32,
    /// The index of the vertex within its tile.
    pub local_id: u32,
}

impl VertexId {
    /// The empty sentinel; never refers to an actual vertex.
    pub const EMPTY: VertexId = VertexId {
        tile_id: u32::MAX,
        local_id: u32::MAX,
    };

    #[inline]
    pub const fn new(tile_id: u32, local_id: u32) -> Self {
        Self { tile_id, local_id }
    }

    /// Packs the id into a single 64-bit value (tile id in the high half).
    #[inline]
    pub const fn encode(self) -> u64 {
        ((self.tile_id as u64) << 32) | self.local_id as u64
    }

    /// The inverse of [`VertexId::encode`].
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(value: u64) -> Self {
        Self {
            tile_id: (value >> 32) as u32,
            local_id: value as u32,
        }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.tile_id == u32::MAX && self.local_id == u32::MAX
    }
}

impl Display for VertexId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("v{}/{}", self.tile_id, self.local_id))
    }
}

/// An identifier of an edge within the tiled graph.
///
/// An edge is canonically owned by the tile of its first vertex and gets a
/// dense index there, strictly below [`EdgeId::MIN_CROSS_ID`]. An edge that
/// crosses into a neighbouring tile additionally has a *mirror record* in
/// that tile; mirror records are addressed with a local id at or above
/// [`EdgeId::MIN_CROSS_ID`] and carry the canonical id in their payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct EdgeId {
    /// The id of the tile in which this record lives.
    pub tile_id: u32,
    /// The index (canonical) or tagged record offset (mirror) within the tile.
    pub local_id: u32,
}

impl EdgeId {
    /// The empty sentinel; never refers to an actual edge.
    pub const EMPTY: EdgeId = EdgeId {
        tile_id: u32::MAX,
        local_id: u32::MAX,
    };

    /// The smallest local id denoting a mirror record of a cross-tile edge.
    pub const MIN_CROSS_ID: u32 = u32::MAX / 2;

    #[inline]
    pub const fn new(tile_id: u32, local_id: u32) -> Self {
        Self { tile_id, local_id }
    }

    /// Packs the id into a single 64-bit value (tile id in the high half).
    #[inline]
    pub const fn encode(self) -> u64 {
        ((self.tile_id as u64) << 32) | self.local_id as u64
    }

    /// The inverse of [`EdgeId::encode`].
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(value: u64) -> Self {
        Self {
            tile_id: (value >> 32) as u32,
            local_id: value as u32,
        }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.tile_id == u32::MAX && self.local_id == u32::MAX
    }

    /// Does this id address a mirror record rather than a canonical edge?
    #[inline]
    pub const fn is_mirror(self) -> bool {
        self.local_id >= Self::MIN_CROSS_ID && !self.is_empty()
    }
}

impl Display for EdgeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("e{}/{}", self.tile_id, self.local_id))
    }
}

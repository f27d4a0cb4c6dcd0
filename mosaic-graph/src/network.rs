//! The routing network: a sparse collection of tiles plus the attribute-set
//! indexes they encode their classifications against.
//!
//! A [`RoutingNetwork`] is a *value*. Reads never lock: a reader holds a
//! snapshot (usually through `Arc`) and walks its tiles freely. All
//! mutation goes through the writer and mutator handles on
//! [`RouterDb`](crate::RouterDb), which work on their own copy of the value
//! and publish it wholesale. Tiles are held through `Arc`, so cloning a
//! network is cheap and copy-on-write happens per tile on first touch.

use crate::attribute_index::AttributeSetIndex;
use crate::enumerator::EdgeEnumerator;
use crate::graph_tile::GraphTile;
use crate::spatial;
use crate::tiling;
use crate::{EdgeId, GraphError, VertexId};
use geo::{Coord, Rect, coord};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A tile together with the classification generation it was last
/// rewritten for.
#[derive(Clone, Debug)]
pub struct TileEntry {
    pub(crate) tile: Arc<GraphTile>,
    pub(crate) edge_type_generation: u32,
}

impl TileEntry {
    #[inline]
    pub fn tile(&self) -> &GraphTile {
        &self.tile
    }

    /// The edge-type index generation this tile's type ids belong to.
    /// Type ids from tiles at different generations are not comparable.
    #[inline]
    pub fn edge_type_generation(&self) -> u32 {
        self.edge_type_generation
    }
}

#[derive(Clone, Debug)]
pub struct RoutingNetwork {
    pub(crate) zoom: u8,
    pub(crate) tiles: BTreeMap<u32, TileEntry>,
    pub(crate) edge_types: Arc<AttributeSetIndex>,
    pub(crate) turn_cost_types: Arc<AttributeSetIndex>,
}

impl Default for RoutingNetwork {
    fn default() -> Self {
        Self::new(tiling::DEFAULT_ZOOM)
    }
}

impl RoutingNetwork {
    pub fn new(zoom: u8) -> Self {
        Self {
            zoom,
            tiles: BTreeMap::new(),
            edge_types: Arc::new(AttributeSetIndex::identity()),
            turn_cost_types: Arc::new(AttributeSetIndex::identity()),
        }
    }

    #[inline]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    #[inline]
    pub fn tile(&self, tile_id: u32) -> Option<&GraphTile> {
        self.tiles.get(&tile_id).map(|entry| &*entry.tile)
    }

    #[inline]
    pub fn tile_entry(&self, tile_id: u32) -> Option<&TileEntry> {
        self.tiles.get(&tile_id)
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn edge_types(&self) -> &AttributeSetIndex {
        &self.edge_types
    }

    #[inline]
    pub fn turn_cost_types(&self) -> &AttributeSetIndex {
        &self.turn_cost_types
    }

    /// The coordinate of a vertex anywhere in the network.
    pub fn vertex(&self, vertex: VertexId) -> Option<Coord<f64>> {
        self.tile(vertex.tile_id)?.try_get_vertex(vertex)
    }

    /// An enumerator over this network's edges (see [`EdgeEnumerator`]).
    pub fn edge_enumerator(&self) -> EdgeEnumerator<'_> {
        EdgeEnumerator::new(self)
    }

    /// Every vertex whose coordinate falls inside `rect`, walked tile by
    /// tile in id order.
    pub fn search_vertices_in_box<'a>(
        &'a self,
        rect: &Rect<f64>,
    ) -> impl Iterator<Item = (VertexId, Coord<f64>)> + use<'a> {
        let rect = *rect;
        tiling::tiles_in_rect(rect, self.zoom)
            .filter_map(move |tile_id| self.tiles.get(&tile_id))
            .flat_map(move |entry| {
                let tile = &*entry.tile;
                (0..tile.vertex_count()).filter_map(move |local_id| {
                    let vertex = VertexId::new(tile.tile_id(), local_id);
                    let coordinate = tile.try_get_vertex(vertex)?;
                    let inside = coordinate.x >= rect.min().x
                        && coordinate.x <= rect.max().x
                        && coordinate.y >= rect.min().y
                        && coordinate.y <= rect.max().y;
                    inside.then_some((vertex, coordinate))
                })
            })
    }

    /// The canonical id of every edge in the network, in tile-id order.
    /// Cross-tile edges appear once (their mirror records are skipped).
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.tiles.iter().flat_map(|(tile_id, entry)| {
            let tile_id = *tile_id;
            (0..entry.tile.edge_count()).map(move |local_id| EdgeId::new(tile_id, local_id))
        })
    }

    // Append operations below are reachable only through the writer and
    // mutator handles, which own a private copy of the network value.

    /// The tile with the given id, created empty if absent and rewritten
    /// first if its edge types trail the current index generation.
    pub(crate) fn tile_mut(&mut self, tile_id: u32) -> &mut GraphTile {
        let zoom = self.zoom;
        let current_generation = self.edge_types.generation();
        let edge_types = Arc::clone(&self.edge_types);

        let entry = self.tiles.entry(tile_id).or_insert_with(|| TileEntry {
            tile: Arc::new(GraphTile::new(zoom, tile_id)),
            edge_type_generation: current_generation,
        });
        if entry.edge_type_generation != current_generation {
            entry.tile = Arc::new(edge_types.update(&entry.tile));
            entry.edge_type_generation = current_generation;
        }
        Arc::make_mut(&mut entry.tile)
    }

    pub(crate) fn add_vertex(&mut self, lon: f64, lat: f64) -> VertexId {
        let tile_id = tiling::tile_id_for(coord! { x: lon, y: lat }, self.zoom);
        self.tile_mut(tile_id).add_vertex(lon, lat)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn add_edge(
        &mut self,
        vertex1: VertexId,
        vertex2: VertexId,
        shape: &[Coord<f64>],
        attributes: &[(String, String)],
    ) -> Result<EdgeId, GraphError> {
        let from = self
            .vertex(vertex1)
            .ok_or_else(|| GraphError::NotFound(format!("vertex {vertex1}")))?;
        let to = self
            .vertex(vertex2)
            .ok_or_else(|| GraphError::NotFound(format!("vertex {vertex2}")))?;

        let mut polyline = Vec::with_capacity(shape.len() + 2);
        polyline.push(from);
        polyline.extend_from_slice(shape);
        polyline.push(to);
        let length_cm = (spatial::polyline_length_m(&polyline) * 100.0).round() as u32;

        let edge_type_id = (!attributes.is_empty()).then(|| self.edge_types.get(attributes));

        let canonical = self.tile_mut(vertex1.tile_id).add_edge(
            vertex1,
            vertex2,
            shape,
            attributes,
            None,
            edge_type_id,
            Some(length_cm),
        )?;
        if vertex2.tile_id != vertex1.tile_id {
            self.tile_mut(vertex2.tile_id).add_edge(
                vertex1,
                vertex2,
                shape,
                attributes,
                Some(canonical),
                edge_type_id,
                Some(length_cm),
            )?;
        }
        Ok(canonical)
    }

    pub(crate) fn add_turn_costs(
        &mut self,
        vertex: VertexId,
        attributes: &[(String, String)],
        edges: &[EdgeId],
        costs: &[u32],
    ) -> Result<(), GraphError> {
        let turn_cost_type = self.turn_cost_types.get(attributes);
        self.tile_mut(vertex.tile_id)
            .add_turn_costs(vertex, turn_cost_type, edges, costs)
    }

    /// Installs an externally produced tile (e.g. from a data provider).
    pub(crate) fn install_tile(
        &mut self,
        tile: GraphTile,
        edge_type_generation: u32,
    ) -> Result<(), GraphError> {
        if tile.zoom() != self.zoom {
            return Err(GraphError::InvalidArgument(format!(
                "tile zoom {} does not match network zoom {}",
                tile.zoom(),
                self.zoom
            )));
        }
        self.tiles.insert(
            tile.tile_id(),
            TileEntry {
                tile: Arc::new(tile),
                edge_type_generation,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_with_line() -> (RoutingNetwork, Vec<VertexId>) {
        let mut network = RoutingNetwork::new(14);
        let vertices = vec![
            network.add_vertex(0.000_1, 0.000_1),
            network.add_vertex(0.000_5, 0.000_1),
            network.add_vertex(0.000_9, 0.000_1),
        ];
        network
            .add_edge(vertices[0], vertices[1], &[], &[])
            .unwrap();
        network
            .add_edge(vertices[1], vertices[2], &[], &[])
            .unwrap();
        (network, vertices)
    }

    #[test]
    fn test_search_vertices_in_box() {
        let (network, vertices) = network_with_line();

        let rect = Rect::new(
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 0.000_6, y: 0.000_2 },
        );
        let found: Vec<VertexId> = network
            .search_vertices_in_box(&rect)
            .map(|(vertex, _)| vertex)
            .collect();
        assert_eq!(found, vec![vertices[0], vertices[1]]);
    }

    #[test]
    fn test_cross_tile_edge_appears_once() {
        let mut network = RoutingNetwork::new(14);
        let west = network.add_vertex(-0.000_5, 0.000_1);
        let east = network.add_vertex(0.000_5, 0.000_1);
        assert_ne!(west.tile_id, east.tile_id);

        let edge = network.add_edge(west, east, &[], &[]).unwrap();
        assert_eq!(edge.tile_id, west.tile_id);
        assert!(!edge.is_mirror());

        // Both tiles hold a record, but only the canonical one is listed.
        assert_eq!(network.tile_count(), 2);
        let ids: Vec<EdgeId> = network.edge_ids().collect();
        assert_eq!(ids, vec![edge]);

        // The mirror record in the east tile names the canonical id.
        let east_tile = network.tile(east.tile_id).unwrap();
        let head = east_tile.head_pointer(east.local_id).unwrap();
        assert_eq!(east_tile.record_at(head).canonical, Some(edge));
    }

    #[test]
    fn test_add_edge_requires_vertices() {
        let mut network = RoutingNetwork::new(14);
        let a = network.add_vertex(0.000_1, 0.000_1);
        let ghost = VertexId::new(a.tile_id, 17);

        assert!(matches!(
            network.add_edge(a, ghost, &[], &[]),
            Err(GraphError::NotFound(_))
        ));
    }

    #[test]
    fn test_edge_length_is_computed() {
        let (network, vertices) = network_with_line();
        let tile = network.tile(vertices[0].tile_id).unwrap();
        let record = tile.record_at(tile.offset_for(EdgeId::new(tile.tile_id(), 0)).unwrap());

        // 0.0004 degrees of longitude at the equator is about 44.5 m.
        let length = record.length_cm.unwrap();
        assert!((4_400..4_500).contains(&length), "length was {length}cm");
    }
}

//! # mosaic-graph
//!
//! A tiled, mutation-friendly routing graph.
//!
//! The street network is stored in square Web-Mercator tiles at a fixed
//! zoom ([`tiling`]). Each [`GraphTile`] packs its vertices, edge records,
//! geometries, attribute bags, and turn-cost tables into append-only byte
//! arenas ([`codec`]). Tiles roll up into a [`RoutingNetwork`] snapshot
//! value, and a [`RouterDb`] manages the read / mutate / publish lifecycle
//! on top: any number of lock-free readers on the latest snapshot, and at
//! most one writer *or* mutator preparing the next one.
//!
//! Edge and turn-cost classifications are interned through
//! [`AttributeSetIndex`]es, which map attribute bags onto compact ids and
//! track a generation so tiles can be rewritten lazily when the
//! classification function changes.
//!
//! Routing itself (snapping, search) lives in the `mosaic-router` crate,
//! which consumes this one through the [`EdgeEnumerator`].

pub mod attribute_index;
pub mod codec;
mod enumerator;
mod graph_id;
pub mod graph_tile;
mod network;
mod router_db;
pub mod serialize;
pub mod spatial;
pub mod tile_provider;
pub mod tiling;

use thiserror::Error;

// Re-exports flatten the module hierarchy for the common types; the
// implementation wants lots of files, but callers shouldn't need to care.
pub use attribute_index::{AttributeSetIndex, Classifier};
pub use enumerator::EdgeEnumerator;
pub use graph_id::{EdgeId, VertexId};
pub use graph_tile::{GraphTile, TurnCostTable};
pub use network::{RoutingNetwork, TileEntry};
pub use router_db::{GraphMutator, GraphWriter, RouterDb, RouterDbConfig};

/// The error type for graph storage and lifecycle operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A writer/mutator lifecycle violation (e.g. obtaining a second
    /// exclusive handle while one is live).
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// A vertex or edge id that does not refer to anything.
    #[error("not found: {0}")]
    NotFound(String),
    /// A structurally invalid request, such as a cross-tile mirror record
    /// without its canonical id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Malformed persisted data. Only detected at load; in-memory tiles
    /// are trusted.
    #[error("corrupt data: {0}")]
    Corrupt(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tile provider error: {0}")]
    Provider(#[from] tile_provider::TileProviderError),
}

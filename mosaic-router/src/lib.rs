//! # mosaic-router
//!
//! Snapping and edge-based shortest-path search over `mosaic-graph`
//! networks.
//!
//! A query starts by [snapping](snap_in_box) coordinates onto the nearest
//! acceptable edges, producing [`SnapPoint`]s. Those feed a [`Dijkstra`]
//! one-to-one or one-to-many search parameterized by a [`CostModel`],
//! which yields a [`Path`] per reached target.
//!
//! The search operates on a single immutable
//! [`RoutingNetwork`](mosaic_graph::RoutingNetwork) snapshot; mutations
//! published concurrently through the database never affect a search in
//! flight. Keep one [`Dijkstra`] instance per thread — it reuses its
//! internal buffers across calls.

pub mod cost;
pub mod dijkstra;
pub mod path;
pub mod snap;

pub use cost::{CostModel, DistanceCost, Weight};
pub use dijkstra::{Dijkstra, PreviousEdges};
pub use path::Path;
pub use snap::{SnapPoint, snap_all_in_box, snap_in_box};

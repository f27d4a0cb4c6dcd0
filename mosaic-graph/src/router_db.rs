//! # The router database and its read / mutate / publish lifecycle
//!
//! A [`RouterDb`] owns the `latest` slot: the current [`RoutingNetwork`]
//! snapshot, swapped atomically on publication. Readers load the snapshot
//! without locking and keep walking it for as long as they hold it; they
//! never observe a half-updated tile.
//!
//! Mutation goes through exactly one of two exclusive handles at a time:
//!
//! - a [`GraphWriter`] is the append-only build handle. It appends into
//!   uniquely owned tiles in place and publishes when dropped.
//! - a [`GraphMutator`] is the copy-on-write edit handle. Tiles are cloned
//!   lazily on first touch, and nothing becomes visible unless
//!   [`GraphMutator::commit`] is called; dropping the handle without
//!   committing discards the changes.
//!
//! Obtaining either handle while the other (or a second of the same kind)
//! is live fails with [`GraphError::InvalidState`]. Both handles restore
//! the idle state when dropped, on every exit path.

use crate::attribute_index::Classifier;
use crate::graph_tile::GraphTile;
use crate::network::RoutingNetwork;
use crate::serialize;
use crate::tile_provider::TileDataProvider;
use crate::tiling;
use crate::{EdgeId, GraphError, VertexId};
use arc_swap::ArcSwap;
use geo::Coord;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug)]
pub struct RouterDbConfig {
    /// The slippy-map zoom of the tiling; fixed for the graph's lifetime.
    pub zoom: u8,
}

impl Default for RouterDbConfig {
    fn default() -> Self {
        Self {
            zoom: tiling::DEFAULT_ZOOM,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LifecycleState {
    Idle,
    WriterOut,
    MutatorOut,
}

pub struct RouterDb {
    latest: ArcSwap<RoutingNetwork>,
    state: Mutex<LifecycleState>,
    provider: Option<Arc<dyn TileDataProvider>>,
    metadata: Mutex<Vec<(String, String)>>,
}

impl Default for RouterDb {
    fn default() -> Self {
        Self::new(RouterDbConfig::default())
    }
}

impl RouterDb {
    pub fn new(config: RouterDbConfig) -> Self {
        Self {
            latest: ArcSwap::from_pointee(RoutingNetwork::new(config.zoom)),
            state: Mutex::new(LifecycleState::Idle),
            provider: None,
            metadata: Mutex::new(Vec::new()),
        }
    }

    /// Attaches a demand-load data provider (see
    /// [`RouterDb::notify_tiles`]).
    #[must_use]
    pub fn with_data_provider(mut self, provider: Arc<dyn TileDataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// The current network snapshot.
    ///
    /// The returned value is immutable; a later publication replaces the
    /// slot but never the snapshot itself.
    #[inline]
    pub fn latest(&self) -> Arc<RoutingNetwork> {
        self.latest.load_full()
    }

    pub fn zoom(&self) -> u8 {
        self.latest.load().zoom()
    }

    /// Free-form metadata persisted alongside the network.
    pub fn metadata(&self) -> Vec<(String, String)> {
        self.metadata.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn set_metadata(&self, metadata: Vec<(String, String)>) {
        if let Ok(mut slot) = self.metadata.lock() {
            *slot = metadata;
        }
    }

    fn acquire(&self, target: LifecycleState) -> Result<(), GraphError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GraphError::InvalidState("lifecycle lock poisoned"))?;
        if *state != LifecycleState::Idle {
            return Err(GraphError::InvalidState(
                "a writer or mutator is already live",
            ));
        }
        *state = target;
        Ok(())
    }

    fn release(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = LifecycleState::Idle;
        }
    }

    /// Obtains the exclusive append-only writer.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidState`] if a writer or mutator is already live.
    pub fn get_writer(&self) -> Result<GraphWriter<'_>, GraphError> {
        self.acquire(LifecycleState::WriterOut)?;
        tracing::debug!("writer obtained");
        Ok(GraphWriter {
            db: self,
            network: (*self.latest.load_full()).clone(),
        })
    }

    /// Obtains the exclusive copy-on-write mutator.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidState`] if a writer or mutator is already live.
    pub fn get_mutator(&self) -> Result<GraphMutator<'_>, GraphError> {
        self.acquire(LifecycleState::MutatorOut)?;
        tracing::debug!("mutator obtained");
        Ok(GraphMutator {
            db: self,
            network: (*self.latest.load_full()).clone(),
            committed: false,
        })
    }

    /// Demand-loads the given tiles through the data provider, if one is
    /// attached and the tiles are not already present.
    ///
    /// Fetching blocks on the provider. If a writer or mutator is live, the
    /// notification is skipped so callers degrade to the current snapshot
    /// instead of deadlocking.
    ///
    /// # Errors
    ///
    /// Propagates provider failures and [`GraphError::Corrupt`] for
    /// undecodable tile payloads.
    pub fn notify_tiles<I>(&self, tile_ids: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = u32>,
    {
        let Some(provider) = self.provider.clone() else {
            return Ok(());
        };

        let network = self.latest();
        let missing: Vec<u32> = tile_ids
            .into_iter()
            .filter(|tile_id| network.tile(*tile_id).is_none())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let Ok(mut mutator) = self.get_mutator() else {
            tracing::debug!("skipping tile demand-load; a writer or mutator is live");
            return Ok(());
        };
        let mut installed = 0usize;
        for tile_id in missing {
            if let Some(bytes) = provider.fetch(tile_id)? {
                let (tile, edge_type_generation) = serialize::read_tile(&bytes)?;
                mutator.install_tile(tile, edge_type_generation)?;
                installed += 1;
            }
        }
        if installed > 0 {
            tracing::debug!(installed, "demand-loaded tiles");
            mutator.commit();
        }
        Ok(())
    }

    /// Persists the current snapshot and metadata.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the writer.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), GraphError> {
        serialize::write_network(&self.latest(), &self.metadata(), writer)
    }

    /// Restores a database from its persisted form.
    ///
    /// Classification functions are not persistable; install them again
    /// through a mutator after loading if classification is in use.
    ///
    /// # Errors
    ///
    /// [`GraphError::Corrupt`] for malformed input and [`GraphError::Io`]
    /// for read failures.
    pub fn read_from<R: Read>(reader: R) -> Result<Self, GraphError> {
        let (network, metadata) = serialize::read_network(reader)?;
        Ok(Self {
            latest: ArcSwap::from_pointee(network),
            state: Mutex::new(LifecycleState::Idle),
            provider: None,
            metadata: Mutex::new(metadata),
        })
    }
}

/// The exclusive append-only write handle (see the module docs).
pub struct GraphWriter<'a> {
    db: &'a RouterDb,
    network: RoutingNetwork,
}

impl GraphWriter<'_> {
    /// The in-progress network state.
    pub fn network(&self) -> &RoutingNetwork {
        &self.network
    }

    /// Adds a vertex to the tile containing its coordinate.
    pub fn add_vertex(&mut self, lon: f64, lat: f64) -> VertexId {
        self.network.add_vertex(lon, lat)
    }

    /// Adds an edge, writing the canonical record into `vertex1`'s tile and
    /// a mirror record into `vertex2`'s tile when they differ. The edge
    /// type id is assigned from the attribute bag, and the length from the
    /// haversine length of the full shape.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] if either vertex does not exist.
    pub fn add_edge(
        &mut self,
        vertex1: VertexId,
        vertex2: VertexId,
        shape: &[Coord<f64>],
        attributes: &[(String, String)],
    ) -> Result<EdgeId, GraphError> {
        self.network.add_edge(vertex1, vertex2, shape, attributes)
    }

    /// Attaches a turn-cost matrix to a vertex. The turn-cost type id is
    /// assigned from the attribute bag.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] if the vertex does not exist;
    /// [`GraphError::InvalidArgument`] if the matrix does not match the
    /// edge list.
    pub fn add_turn_costs(
        &mut self,
        vertex: VertexId,
        attributes: &[(String, String)],
        edges: &[EdgeId],
        costs: &[u32],
    ) -> Result<(), GraphError> {
        self.network.add_turn_costs(vertex, attributes, edges, costs)
    }
}

impl Drop for GraphWriter<'_> {
    fn drop(&mut self) {
        let network = std::mem::take(&mut self.network);
        self.db.latest.store(Arc::new(network));
        self.db.release();
        tracing::debug!("writer dropped; network published");
    }
}

/// The exclusive copy-on-write edit handle (see the module docs).
pub struct GraphMutator<'a> {
    db: &'a RouterDb,
    network: RoutingNetwork,
    committed: bool,
}

impl GraphMutator<'_> {
    /// The in-progress network state.
    pub fn network(&self) -> &RoutingNetwork {
        &self.network
    }

    /// See [`GraphWriter::add_vertex`].
    pub fn add_vertex(&mut self, lon: f64, lat: f64) -> VertexId {
        self.network.add_vertex(lon, lat)
    }

    /// See [`GraphWriter::add_edge`].
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] if either vertex does not exist.
    pub fn add_edge(
        &mut self,
        vertex1: VertexId,
        vertex2: VertexId,
        shape: &[Coord<f64>],
        attributes: &[(String, String)],
    ) -> Result<EdgeId, GraphError> {
        self.network.add_edge(vertex1, vertex2, shape, attributes)
    }

    /// See [`GraphWriter::add_turn_costs`].
    ///
    /// # Errors
    ///
    /// [`GraphError::NotFound`] if the vertex does not exist;
    /// [`GraphError::InvalidArgument`] if the matrix does not match the
    /// edge list.
    pub fn add_turn_costs(
        &mut self,
        vertex: VertexId,
        attributes: &[(String, String)],
        edges: &[EdgeId],
        costs: &[u32],
    ) -> Result<(), GraphError> {
        self.network.add_turn_costs(vertex, attributes, edges, costs)
    }

    /// Installs an externally produced tile (e.g. fetched by a data
    /// provider) at the given classification generation.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidArgument`] if the tile's zoom does not match
    /// the network's.
    pub fn install_tile(
        &mut self,
        tile: GraphTile,
        edge_type_generation: u32,
    ) -> Result<(), GraphError> {
        self.network.install_tile(tile, edge_type_generation)
    }

    /// Replaces the edge-type classification function.
    ///
    /// The index generation is bumped; tiles are rewritten lazily, when the
    /// mutator (this one or a later one) first touches them.
    pub fn set_edge_type_classifier(&mut self, classifier: Classifier) {
        let next = self.network.edge_types.next(classifier);
        tracing::debug!(generation = next.generation(), "edge-type classifier replaced");
        self.network.edge_types = Arc::new(next);
    }

    /// Replaces the turn-cost classification function; see
    /// [`GraphMutator::set_edge_type_classifier`].
    pub fn set_turn_cost_classifier(&mut self, classifier: Classifier) {
        let next = self.network.turn_cost_types.next(classifier);
        self.network.turn_cost_types = Arc::new(next);
    }

    /// Atomically publishes the mutated network as the latest snapshot.
    pub fn commit(mut self) {
        let network = std::mem::take(&mut self.network);
        self.db.latest.store(Arc::new(network));
        self.committed = true;
        tracing::debug!("mutator committed; network published");
    }
}

impl Drop for GraphMutator<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!("mutator dropped without commit; changes discarded");
        }
        self.db.release();
    }
}

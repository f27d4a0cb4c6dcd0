//! # Tile data providers
//!
//! A provider materialises serialized tiles on demand: snapping and search
//! notify the database of the tiles they are about to touch, and missing
//! ones are fetched through the attached provider (see
//! [`RouterDb::notify_tiles`](crate::RouterDb::notify_tiles)).
//!
//! Fetching is synchronous; if a provider blocks (network, disk), the
//! caller blocks with it. Caching is the provider's business — the core
//! installs what it is given and keeps no cache of its own.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

mod directory;

pub use directory::DirectoryTileProvider;

#[derive(Debug, Error)]
pub enum TileProviderError {
    #[error("error fetching tile: {0}")]
    FetchError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock is poisoned: {0}")]
    PoisonedCacheLock(String),
}

/// A source of serialized tiles, keyed by tile id.
pub trait TileDataProvider: Send + Sync {
    /// Fetches the serialized bytes of a tile (the single-tile container
    /// produced by [`serialize::write_tile`](crate::serialize::write_tile)).
    ///
    /// `Ok(None)` means the provider has no such tile; that is not an
    /// error, the graph simply does not extend there.
    ///
    /// # Errors
    ///
    /// Implementations surface fetch failures (I/O, transport) as
    /// [`TileProviderError`].
    fn fetch(&self, tile_id: u32) -> Result<Option<Vec<u8>>, TileProviderError>;
}

/// A keyed lock.
///
/// This enables more granular locking than over an entire data structure,
/// e.g. one lock per tile id so concurrent fetches of distinct tiles don't
/// serialize each other.
pub(crate) struct LockTable<K>(DashMap<K, Arc<Mutex<()>>>);

impl<K: std::hash::Hash + Eq + Clone> LockTable<K> {
    pub fn new() -> Self {
        Self(DashMap::new())
    }

    pub fn lock_for(&self, key: K) -> Arc<Mutex<()>> {
        self.0
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

use super::{LockTable, TileDataProvider, TileProviderError};
use lru::LruCache;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// A tile provider backed by a directory of `<tile_id>.mtile` files.
///
/// # Resource consumption
///
/// To minimize file handle churn, fetched payloads are kept in an internal
/// LRU cache, configurable with a max number of cached tiles. Any cached
/// tiles remain in memory until evicted.
pub struct DirectoryTileProvider {
    base_directory: PathBuf,
    lock_table: LockTable<u32>,
    cache: Mutex<LruCache<u32, Arc<Vec<u8>>>>,
}

impl DirectoryTileProvider {
    pub fn new(base_directory: PathBuf, num_cached_tiles: NonZeroUsize) -> Self {
        Self {
            base_directory,
            lock_table: LockTable::new(),
            cache: Mutex::new(LruCache::new(num_cached_tiles)),
        }
    }

    fn path_for(&self, tile_id: u32) -> PathBuf {
        self.base_directory.join(format!("{tile_id}.mtile"))
    }
}

impl TileDataProvider for DirectoryTileProvider {
    fn fetch(&self, tile_id: u32) -> Result<Option<Vec<u8>>, TileProviderError> {
        // Per-tile lock so a concurrent fetch of the same tile reads the
        // file only once.
        let lock = self.lock_table.lock_for(tile_id);
        let _guard = lock
            .lock()
            .map_err(|e| TileProviderError::PoisonedCacheLock(e.to_string()))?;

        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|e| TileProviderError::PoisonedCacheLock(e.to_string()))?;
            if let Some(bytes) = cache.get(&tile_id) {
                return Ok(Some(bytes.as_ref().clone()));
            }
        }

        let bytes = match std::fs::read(self.path_for(tile_id)) {
            Ok(bytes) => Arc::new(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut cache = self
            .cache
            .lock()
            .map_err(|e| TileProviderError::PoisonedCacheLock(e.to_string()))?;
        cache.put(tile_id, Arc::clone(&bytes));
        Ok(Some(bytes.as_ref().clone()))
    }
}

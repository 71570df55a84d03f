// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{path::PathBuf, sync::Arc};

use chunk_cache_common::error::Result;
use chunk_cache_memory::{CacheConfig, SharedMemCache};
use chunk_cache_storage::{FsStoreRegistry, MemStoreRegistry, StoreRegistry};

/// Builder of the process-wide [`SharedMemCache`].
///
/// Build it once at startup, before the first array is created, and hand the result to every
/// [`chunk_cache_memory::ChunkTable`].
#[derive(Debug, Default)]
pub struct ChunkCacheBuilder {
    config: CacheConfig,
    registry: Option<Arc<dyn StoreRegistry>>,
}

impl ChunkCacheBuilder {
    /// Create a builder with the default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder from a loaded config.
    pub fn from_config(config: CacheConfig) -> Self {
        Self { config, registry: None }
    }

    /// Set the resident bytes threshold.
    ///
    /// Default: [`chunk_cache_memory::DEFAULT_MEM_THRESHOLD`].
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Spill chunks to files under the directory.
    ///
    /// Stale data stores left in the directory are removed on build. Spilled chunks are kept in memory if no directory
    /// is set.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.dir = Some(dir.into());
        self
    }

    /// Set the smallest allocation of a data store. Must be a power of two.
    ///
    /// Default: [`chunk_cache_storage::DEFAULT_MIN_ALLOC_SIZE`].
    pub fn with_min_alloc_size(mut self, min_alloc_size: usize) -> Self {
        self.config.min_alloc_size = min_alloc_size;
        self
    }

    /// Use a custom registry of data stores. Overrides the directory.
    pub fn with_registry(mut self, registry: Arc<dyn StoreRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Verify the config, clear all stores of the registry and build the cache.
    pub fn build(self) -> Result<Arc<SharedMemCache>> {
        self.config.verify()?;

        let registry: Arc<dyn StoreRegistry> = match (self.registry, self.config.dir.as_ref()) {
            (Some(registry), _) => registry,
            (None, Some(dir)) => Arc::new(FsStoreRegistry::open(dir, self.config.min_alloc_size)?),
            (None, None) => Arc::new(MemStoreRegistry::new(self.config.min_alloc_size)),
        };
        registry.clear_all_stores()?;

        tracing::info!(
            "[chunk cache]: build with threshold: {}, registry: {:?}",
            self.config.threshold,
            registry
        );
        Ok(Arc::new(SharedMemCache::new(self.config.threshold, registry)))
    }
}

#[cfg(test)]
mod tests {
    use chunk_cache_common::error::ErrorKind;
    use chunk_cache_storage::FsDataStore;

    use super::*;

    #[test_log::test]
    fn test_build_clears_stale_stores() {
        let dir = tempfile::tempdir().unwrap();
        let stale = FsDataStore::path_for(dir.path(), 7);
        std::fs::write(&stale, b"stale").unwrap();

        let cache = ChunkCacheBuilder::new()
            .with_threshold(1024)
            .with_dir(dir.path())
            .with_min_alloc_size(512)
            .build()
            .unwrap();
        assert_eq!(cache.threshold(), 1024);
        assert!(!stale.exists());
    }

    #[test]
    fn test_build_invalid_config() {
        let err = ChunkCacheBuilder::new().with_min_alloc_size(1000).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_build_from_config() {
        let registry = Arc::new(MemStoreRegistry::default());
        let config = CacheConfig {
            threshold: 4096,
            ..Default::default()
        };
        let cache = ChunkCacheBuilder::from_config(config)
            .with_registry(registry)
            .build()
            .unwrap();
        assert_eq!(cache.threshold(), 4096);
        assert_eq!(cache.resident_bytes(), 0);
    }
}

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

use std::{
    collections::HashMap,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use chunk_cache_common::error::{Error, Result};
use parking_lot::Mutex;

use crate::{
    file::FsDataStore,
    mem::MemDataStore,
    store::{DataStore, DataStoreRef, Guid},
};

/// Default smallest allocation of a data store.
pub const DEFAULT_MIN_ALLOC_SIZE: usize = 4 * 1024;

/// Registry of the data stores of all arrays.
pub trait StoreRegistry: Send + Sync + Debug + 'static {
    /// Get the store `guid`, create it if it does not exist yet.
    fn get_store(&self, guid: Guid) -> Result<DataStoreRef>;

    /// Forget the store `guid`. If `remove` is set, its data is deleted as well.
    fn close_store(&self, guid: Guid, remove: bool) -> Result<()>;

    /// Delete all stores, opened or not.
    fn clear_all_stores(&self) -> Result<()>;

    /// Flush all opened stores.
    fn flush_all_stores(&self) -> Result<()>;
}

/// Registry of [`FsDataStore`]s under one base directory.
#[derive(Debug)]
pub struct FsStoreRegistry {
    dir: PathBuf,
    min_alloc_size: usize,
    stores: Mutex<HashMap<Guid, Arc<FsDataStore>>>,
}

impl FsStoreRegistry {
    /// Open the registry, create the base directory if necessary.
    pub fn open(dir: impl AsRef<Path>, min_alloc_size: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| Error::io_error(e).with_context("dir", dir.display()))?;
        tracing::debug!("[fs registry]: opened at {dir:?}, min alloc size: {min_alloc_size}");
        Ok(Self {
            dir,
            min_alloc_size,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Base directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Count of opened stores.
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// Check if no store is opened.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoreRegistry for FsStoreRegistry {
    fn get_store(&self, guid: Guid) -> Result<DataStoreRef> {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(&guid) {
            return Ok(store.clone());
        }
        let store = Arc::new(FsDataStore::open(&self.dir, guid, self.min_alloc_size)?);
        stores.insert(guid, store.clone());
        Ok(store)
    }

    fn close_store(&self, guid: Guid, remove: bool) -> Result<()> {
        let store = self.stores.lock().remove(&guid);
        tracing::debug!("[fs registry]: close store {guid}, remove: {remove}, opened: {}", store.is_some());
        match store {
            Some(store) if remove => store.remove_on_close(),
            Some(_) => {}
            None if remove => {
                let path = FsDataStore::path_for(&self.dir, guid);
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io_error(e).with_context("path", path.display())),
                }
            }
            None => {}
        }
        Ok(())
    }

    fn clear_all_stores(&self) -> Result<()> {
        for (_, store) in self.stores.lock().drain() {
            store.remove_on_close();
        }

        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| Error::io_error(e).with_context("dir", self.dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "data") {
                tracing::debug!("[fs registry]: clear {path:?}");
                std::fs::remove_file(&path).map_err(|e| Error::io_error(e).with_context("path", path.display()))?;
            }
        }
        Ok(())
    }

    fn flush_all_stores(&self) -> Result<()> {
        let stores = self.stores.lock().values().cloned().collect::<Vec<_>>();
        for store in stores {
            store.flush()?;
        }
        Ok(())
    }
}

/// Registry of [`MemDataStore`]s.
#[derive(Debug)]
pub struct MemStoreRegistry {
    min_alloc_size: usize,
    stores: Mutex<HashMap<Guid, Arc<MemDataStore>>>,
}

impl Default for MemStoreRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ALLOC_SIZE)
    }
}

impl MemStoreRegistry {
    /// Create an empty registry.
    pub fn new(min_alloc_size: usize) -> Self {
        Self {
            min_alloc_size,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Count of opened stores.
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// Check if no store is opened.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if store `guid` is opened.
    pub fn contains(&self, guid: Guid) -> bool {
        self.stores.lock().contains_key(&guid)
    }
}

impl StoreRegistry for MemStoreRegistry {
    fn get_store(&self, guid: Guid) -> Result<DataStoreRef> {
        let store = self
            .stores
            .lock()
            .entry(guid)
            .or_insert_with(|| Arc::new(MemDataStore::new(guid, self.min_alloc_size)))
            .clone();
        Ok(store)
    }

    fn close_store(&self, guid: Guid, _: bool) -> Result<()> {
        self.stores.lock().remove(&guid);
        Ok(())
    }

    fn clear_all_stores(&self) -> Result<()> {
        self.stores.lock().clear();
        Ok(())
    }

    fn flush_all_stores(&self) -> Result<()> {
        Ok(())
    }
}

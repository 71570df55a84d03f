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

//! Fault injection for data stores.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use chunk_cache_common::error::{Error, ErrorKind, Result};

use crate::{
    registry::{MemStoreRegistry, StoreRegistry},
    store::{DataStore, DataStoreRef, Guid},
};

/// Switches shared by a [`FaultyRegistry`] and all stores it hands out.
#[derive(Debug, Default)]
pub struct Faults {
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
    reads: AtomicUsize,
}

impl Faults {
    /// Make all following writes fail or succeed.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Make all following reads fail or succeed.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Count of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Count of successful reads.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

/// A registry that wraps the stores of another registry and injects i/o errors on demand.
#[derive(Debug)]
pub struct FaultyRegistry {
    inner: Arc<dyn StoreRegistry>,
    faults: Arc<Faults>,
}

impl Default for FaultyRegistry {
    fn default() -> Self {
        Self::new(Arc::new(MemStoreRegistry::default()))
    }
}

impl FaultyRegistry {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn StoreRegistry>) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    /// The fault switches.
    pub fn faults(&self) -> &Arc<Faults> {
        &self.faults
    }
}

impl StoreRegistry for FaultyRegistry {
    fn get_store(&self, guid: Guid) -> Result<DataStoreRef> {
        let inner = self.inner.get_store(guid)?;
        Ok(Arc::new(FaultyStore {
            inner,
            faults: self.faults.clone(),
        }))
    }

    fn close_store(&self, guid: Guid, remove: bool) -> Result<()> {
        self.inner.close_store(guid, remove)
    }

    fn clear_all_stores(&self) -> Result<()> {
        self.inner.clear_all_stores()
    }

    fn flush_all_stores(&self) -> Result<()> {
        self.inner.flush_all_stores()
    }
}

#[derive(Debug)]
struct FaultyStore {
    inner: DataStoreRef,
    faults: Arc<Faults>,
}

fn injected(op: &'static str, guid: Guid, offset: u64) -> Error {
    Error::new(ErrorKind::Io, "injected i/o error")
        .with_context("op", op)
        .with_context("store", guid)
        .with_context("offset", offset)
        .with_source(std::io::Error::other("injected"))
}

impl DataStore for FaultyStore {
    fn guid(&self) -> Guid {
        self.inner.guid()
    }

    fn allocate_space(&self, size: usize) -> Result<(u64, usize)> {
        self.inner.allocate_space(size)
    }

    fn free_chunk(&self, offset: u64, allocated: usize) -> Result<()> {
        self.inner.free_chunk(offset, allocated)
    }

    fn write_data(&self, offset: u64, data: &[u8], allocated: usize) -> Result<()> {
        if self.faults.fail_writes.load(Ordering::Relaxed) {
            return Err(injected("write", self.guid(), offset));
        }
        self.inner.write_data(offset, data, allocated)?;
        self.faults.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_data(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if self.faults.fail_reads.load(Ordering::Relaxed) {
            return Err(injected("read", self.guid(), offset));
        }
        self.inner.read_data(offset, buf)?;
        self.faults.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn overhead(&self) -> usize {
        self.inner.overhead()
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faulty_registry() {
        let registry = FaultyRegistry::default();
        let store = registry.get_store(1).unwrap();
        let (offset, allocated) = store.allocate_space(4).unwrap();

        registry.faults().set_fail_writes(true);
        let err = store.write_data(offset, b"abcd", allocated).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.downcast_ref::<std::io::Error>().is_some());

        registry.faults().set_fail_writes(false);
        store.write_data(offset, b"abcd", allocated).unwrap();
        assert_eq!(registry.faults().writes(), 1);

        let mut buf = [0; 4];
        registry.faults().set_fail_reads(true);
        assert!(store.read_data(offset, &mut buf).is_err());
        registry.faults().set_fail_reads(false);
        store.read_data(offset, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");
        assert_eq!(registry.faults().reads(), 1);
    }
}

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

use std::{fmt::Debug, sync::Arc};

use chunk_cache_common::{
    error::{Error, ErrorKind, Result},
    strict_assert, strict_assert_eq,
};
use chunk_cache_storage::{DataStoreRef, Guid, StoreRegistry};
use intrusive_collections::LinkedList;
use parking_lot::Mutex;

use crate::{
    chunk::{Body, Chunk, ChunkData, DiskSpan, LruAdapter, SpillSlot},
    statistics::Statistics,
};

struct CacheInner {
    resident_bytes: usize,
    threshold: usize,
    /// Resident and unpinned chunks, the least recently unpinned first.
    lru: LinkedList<LruAdapter>,
    /// Guid of the next data store to create.
    next_generation: Guid,
}

impl CacheInner {
    fn uncharge(&mut self, chunk: &Chunk, bytes: usize) {
        assert!(
            self.resident_bytes >= bytes,
            "resident bytes {} underflow on chunk {:?}, uncharge: {bytes}",
            self.resident_bytes,
            chunk,
        );
        self.resident_bytes -= bytes;
    }

    fn unlink(&mut self, chunk: &Arc<Chunk>) {
        strict_assert!(chunk.is_in_lru());
        // The chunk is linked and the cache only has one queue.
        unsafe { self.lru.cursor_mut_from_ptr(Arc::as_ptr(chunk)).remove() };
    }

    fn lru_bytes(&self) -> usize {
        self.lru.iter().map(|chunk| chunk.size_at_last_unpin()).sum()
    }

    fn is_coherent(&self) -> bool {
        if self.lru_bytes() > self.resident_bytes {
            return false;
        }
        self.lru.iter().all(|chunk| {
            let data = chunk.data().read();
            chunk.pins() == 0
                && data.body.is_resident()
                && data.size == chunk.size_at_last_unpin()
                && data.disk.is_none_or(|span| span.allocated >= data.size)
        })
    }
}

/// The process-wide chunk cache.
///
/// Bounds the bytes of resident chunks under a threshold by spilling the least recently unpinned chunks to the data
/// stores of their arrays. Every operation runs under one cache lock, including the i/o it triggers.
///
/// Resident bytes count every pinned chunk with the size it had when it was pinned, and every chunk on the LRU queue
/// with its size at last unpin. The size of a pinned chunk may change freely, the delta is accounted on its last unpin.
///
/// Eviction is best effort. Pinned chunks are never evicted, so the resident bytes stay above the threshold as long as
/// the pinned chunks alone exceed it.
pub struct SharedMemCache {
    inner: Mutex<CacheInner>,
    registry: Arc<dyn StoreRegistry>,
    statistics: Statistics,
}

impl Debug for SharedMemCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SharedMemCache")
            .field("resident_bytes", &inner.resident_bytes)
            .field("threshold", &inner.threshold)
            .field("registry", &self.registry)
            .field("statistics", &self.statistics)
            .finish()
    }
}

impl SharedMemCache {
    /// Create a cache with the resident bytes threshold that spills to the stores of the registry.
    pub fn new(threshold: usize, registry: Arc<dyn StoreRegistry>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                resident_bytes: 0,
                threshold,
                lru: LinkedList::new(LruAdapter::new()),
                next_generation: 0,
            }),
            registry,
            statistics: Statistics::default(),
        }
    }

    /// Resident bytes of all pinned and queued chunks.
    pub fn resident_bytes(&self) -> usize {
        self.inner.lock().resident_bytes
    }

    /// Resident bytes threshold.
    pub fn threshold(&self) -> usize {
        self.inner.lock().threshold
    }

    /// Set the resident bytes threshold.
    ///
    /// Takes effect on the next unpin, pin of a spilled chunk, or [`SharedMemCache::evict`].
    pub fn set_threshold(&self, threshold: usize) {
        let mut inner = self.inner.lock();
        tracing::debug!("[cache]: threshold {} => {threshold}", inner.threshold);
        inner.threshold = threshold;
    }

    /// Count of chunks on the LRU queue.
    pub fn lru_len(&self) -> usize {
        self.inner.lock().lru.iter().count()
    }

    /// Recompute the sum of the sizes at last unpin of the chunks on the LRU queue.
    pub fn lru_bytes(&self) -> usize {
        self.inner.lock().lru_bytes()
    }

    /// Counters of the cache.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// The registry of the data stores.
    pub fn registry(&self) -> &Arc<dyn StoreRegistry> {
        &self.registry
    }

    /// Check the accounting of the LRU queue against the resident bytes.
    ///
    /// The sizes at last unpin of the queued chunks must not exceed the resident bytes, and every queued chunk must be
    /// unpinned, resident, and unchanged since its last unpin.
    pub fn check_invariant(&self) -> bool {
        let inner = self.inner.lock();
        let res = inner.is_coherent();
        tracing::trace!(
            "[cache]: check invariant, lru bytes: {}, resident bytes: {}, coherent: {res}",
            inner.lru_bytes(),
            inner.resident_bytes
        );
        res
    }

    /// Pin the chunk, load it from the data store of its array if it has been spilled.
    ///
    /// Nothing is changed if loading fails.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "chunk_cache::memory::cache::pin"))]
    pub fn pin(&self, chunk: &Arc<Chunk>) -> Result<()> {
        let mut inner = self.inner.lock();
        self.pin_locked(&mut inner, chunk)?;
        strict_assert!(inner.is_coherent());
        Ok(())
    }

    /// Unpin the chunk, queue it if it is resident and run eviction if the threshold is exceeded.
    ///
    /// The unpin itself always takes effect. An error is returned only if the eviction it triggered fails.
    ///
    /// # Panics
    ///
    /// Panics if the chunk is not pinned.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "chunk_cache::memory::cache::unpin"))]
    pub fn unpin(&self, chunk: &Arc<Chunk>) -> Result<()> {
        let mut inner = self.inner.lock();
        self.unpin_locked(&mut inner, chunk)?;
        strict_assert!(inner.is_coherent());
        Ok(())
    }

    /// Evict queued chunks until the resident bytes are under the threshold or the queue is empty.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "chunk_cache::memory::cache::evict"))]
    pub fn evict(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.evict_locked(&mut inner)?;
        strict_assert!(inner.is_coherent());
        Ok(())
    }

    /// Release the only pin of the chunk, forget it and free its space in the data store.
    ///
    /// Only the owning table calls this, so that the table entry is removed together with the chunk.
    ///
    /// # Panics
    ///
    /// Panics if the chunk is pinned by others.
    pub(crate) fn delete_chunk(&self, chunk: &Arc<Chunk>) -> Result<()> {
        let mut inner = self.inner.lock();
        assert_eq!(chunk.pins(), 1, "delete chunk {:?} that is still pinned by others", chunk);
        chunk.set_pins(0);
        if !chunk.is_retired() {
            inner.uncharge(chunk, chunk.size_at_last_unpin());
            self.retire_locked(chunk)?;
        }
        strict_assert!(inner.is_coherent());
        Ok(())
    }

    /// Deregister all chunks of a dropped array and remove its data store.
    ///
    /// Chunks that are still pinned are uncharged as well. Their bytes are released on their last unpin.
    pub(crate) fn teardown_array<'a>(&self, slot: &SpillSlot, chunks: impl IntoIterator<Item = &'a Arc<Chunk>>) {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for chunk in chunks {
            count += 1;
            let pins = chunk.pins();
            let queued = chunk.is_in_lru();
            if pins > 0 || queued {
                inner.uncharge(chunk, chunk.size_at_last_unpin());
            }
            if pins > 0 {
                tracing::warn!(
                    "[cache]: tear down array {} while chunk {} is still pinned, pins: {pins}",
                    slot.array(),
                    chunk.address()
                );
            }
            if queued {
                inner.unlink(chunk);
            }
            chunk.set_size_at_last_unpin(0);
            chunk.set_retired();
            if pins == 0 {
                *chunk.data().write() = ChunkData::default();
            }
        }
        strict_assert!(inner.is_coherent());

        let Some(store) = slot.take() else {
            tracing::debug!("[cache]: tear down array {}, chunks: {count}", slot.array());
            return;
        };
        let guid = store.guid();
        drop(store);
        tracing::debug!("[cache]: tear down array {}, chunks: {count}, store: {guid}", slot.array());
        if let Err(e) = self.registry.close_store(guid, true) {
            tracing::warn!("[cache]: failed to remove store {guid} of array {}: {e}", slot.array());
        }
    }

    fn pin_locked(&self, inner: &mut CacheInner, chunk: &Arc<Chunk>) -> Result<()> {
        if chunk.is_retired() {
            return Err(Error::new(ErrorKind::Closed, "chunk has been deleted")
                .with_context("array", chunk.slot().array())
                .with_context("address", chunk.address()));
        }

        let pins = chunk.pins();
        if pins > 0 {
            chunk.set_pins(pins + 1);
            return Ok(());
        }

        if chunk.is_in_lru() {
            // Counted when it was queued.
            inner.unlink(chunk);
            chunk.set_size_at_last_unpin(chunk.size());
            chunk.set_pins(1);
            tracing::trace!("[cache]: pin queued chunk {}", chunk.address());
            return Ok(());
        }

        if inner.resident_bytes > inner.threshold {
            self.evict_locked(inner)?;
        }

        let mut data = chunk.data().write();
        if matches!(data.body, Body::Spilled) {
            self.load(chunk, &mut data)?;
            inner.resident_bytes += data.size;
            tracing::trace!("[cache]: pin spilled chunk {}, size: {}", chunk.address(), data.size);
        }
        chunk.set_size_at_last_unpin(data.size);
        chunk.set_pins(1);
        Ok(())
    }

    fn load(&self, chunk: &Chunk, data: &mut ChunkData) -> Result<()> {
        let span = data.disk.unwrap_or_else(|| panic!("spilled chunk {chunk:?} has no disk span"));
        let store = chunk
            .slot()
            .store()
            .ok_or_else(|| Error::new(ErrorKind::Closed, "data store has been closed").with_context("array", chunk.slot().array()))?;
        let mut buf = vec![0; data.size];
        store.read_data(span.offset, &mut buf)?;
        data.body = Body::Resident(buf);
        chunk.set_dirty(false);
        self.statistics.record_load();
        Ok(())
    }

    fn unpin_locked(&self, inner: &mut CacheInner, chunk: &Arc<Chunk>) -> Result<()> {
        let pins = chunk.pins();
        assert!(pins > 0, "unpin chunk {chunk:?} that is not pinned");
        chunk.set_pins(pins - 1);
        if pins > 1 {
            return Ok(());
        }

        if chunk.is_retired() {
            // Uncharged when it was retired.
            *chunk.data().write() = ChunkData::default();
            return Ok(());
        }

        inner.uncharge(chunk, chunk.size_at_last_unpin());

        let mut data = chunk.data().write();
        if !data.body.is_resident() {
            assert_eq!(data.size, 0, "pinned chunk {chunk:?} lost its bytes");
            chunk.set_size_at_last_unpin(0);
            return Ok(());
        }

        // The chunk may have grown out of its disk span while it was pinned.
        if let (Some(span), Some(store)) = (data.disk, chunk.slot().store()) {
            if span.allocated.saturating_sub(store.overhead()) < data.size {
                if let Err(e) = store.free_chunk(span.offset, span.allocated) {
                    tracing::warn!("[cache]: failed to free span {span:?} of chunk {}: {e}", chunk.address());
                }
                data.disk = None;
            }
        }

        inner.resident_bytes += data.size;
        chunk.set_size_at_last_unpin(data.size);
        drop(data);
        inner.lru.push_back(chunk.clone());
        tracing::trace!("[cache]: unpin chunk {}, resident bytes: {}", chunk.address(), inner.resident_bytes);

        if inner.resident_bytes > inner.threshold {
            self.evict_locked(inner)?;
        }
        Ok(())
    }

    fn evict_locked(&self, inner: &mut CacheInner) -> Result<()> {
        while inner.resident_bytes > inner.threshold {
            let Some(victim) = inner.lru.pop_front() else {
                tracing::trace!(
                    "[cache]: nothing to evict, resident bytes: {}, threshold: {}",
                    inner.resident_bytes,
                    inner.threshold
                );
                break;
            };
            if let Err(e) = self.spill(inner, &victim) {
                inner.lru.push_front(victim);
                return Err(e);
            }
        }
        Ok(())
    }

    fn spill(&self, inner: &mut CacheInner, victim: &Arc<Chunk>) -> Result<()> {
        assert_eq!(victim.pins(), 0, "evict pinned chunk {victim:?}");

        let mut data = victim.data().write();
        let size = data.size;
        strict_assert_eq!(size, victim.size_at_last_unpin());

        let buf = match std::mem::take(&mut data.body) {
            Body::Resident(buf) => buf,
            body => panic!("evict chunk {victim:?} that is not resident: {body:?}"),
        };

        if victim.is_dirty() || data.disk.is_none() {
            if let Err(e) = self.write(inner, victim, &mut data.disk, &buf) {
                data.body = Body::Resident(buf);
                return Err(e);
            }
            victim.set_dirty(false);
            self.statistics.record_swap();
        } else {
            self.statistics.record_drop();
        }

        data.body = Body::Spilled;
        inner.uncharge(victim, size);
        tracing::trace!(
            "[cache]: evicted chunk {} of array {}, size: {size}, resident bytes: {}",
            victim.address(),
            victim.slot().array(),
            inner.resident_bytes
        );
        Ok(())
    }

    fn write(&self, inner: &mut CacheInner, chunk: &Chunk, disk: &mut Option<DiskSpan>, buf: &[u8]) -> Result<()> {
        let store = self.store_for(inner, chunk.slot())?;
        let overhead = store.overhead();

        let span = match *disk {
            Some(span) if span.allocated.saturating_sub(overhead) >= buf.len() => span,
            old => {
                if let Some(span) = old {
                    tracing::trace!("[cache]: free span {span:?} of chunk {}", chunk.address());
                    store.free_chunk(span.offset, span.allocated)?;
                    *disk = None;
                }
                let (offset, allocated) = store.allocate_space(buf.len())?;
                let span = DiskSpan { offset, allocated };
                *disk = Some(span);
                span
            }
        };

        store.write_data(span.offset, buf, span.allocated)
    }

    fn store_for(&self, inner: &mut CacheInner, slot: &SpillSlot) -> Result<DataStoreRef> {
        slot.get_or_init(|| {
            let guid = inner.next_generation;
            inner.next_generation += 1;
            tracing::debug!("[cache]: create store {guid} for array {}", slot.array());
            self.registry.get_store(guid)
        })
    }

    fn retire_locked(&self, chunk: &Arc<Chunk>) -> Result<()> {
        chunk.set_retired();
        chunk.set_size_at_last_unpin(0);
        let data = std::mem::take(&mut *chunk.data().write());
        if let (Some(span), Some(store)) = (data.disk, chunk.slot().store()) {
            store.free_chunk(span.offset, span.allocated)?;
        }
        tracing::trace!("[cache]: deleted chunk {}", chunk.address());
        Ok(())
    }
}

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
    fmt::Debug,
    sync::{
        atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};

use bitflags::bitflags;
use chunk_cache_common::{
    error::Result,
    schema::{Address, ArrayDesc, CompressionMethod},
};
use chunk_cache_storage::{DataStoreRef, Guid};
use intrusive_collections::{intrusive_adapter, LinkedListAtomicLink};
use parking_lot::{Mutex, RwLock};

bitflags! {
    /// State flags of a chunk.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ChunkFlags: u64 {
        /// Changed since the last successful write to the data store.
        const DIRTY = 0b00000001;
        /// Deleted or torn down with its array. Never pinned again.
        const RETIRED = 0b00000010;
    }
}

/// The in-memory state of the chunk bytes.
#[derive(Debug, Default)]
pub enum Body {
    /// No bytes, the logical size is 0.
    #[default]
    Empty,
    /// The bytes are in memory.
    Resident(Vec<u8>),
    /// The bytes only exist in the data store of the array.
    Spilled,
}

impl Body {
    /// Check if the bytes are in memory.
    pub fn is_resident(&self) -> bool {
        matches!(self, Body::Resident(_))
    }
}

/// Location of a spilled chunk in the data store of its array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpan {
    /// Offset of the block.
    pub offset: u64,
    /// Size of the block, header included.
    pub allocated: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ChunkData {
    pub(crate) body: Body,
    pub(crate) size: usize,
    pub(crate) disk: Option<DiskSpan>,
}

/// The per-array spill target, shared by the table and all of its chunks.
///
/// The data store is created on the first spill of a dirty chunk of the array and closed on teardown.
#[derive(Debug)]
pub(crate) struct SpillSlot {
    array: String,
    store: Mutex<Option<DataStoreRef>>,
}

impl SpillSlot {
    pub(crate) fn new(array: impl Into<String>) -> Self {
        Self {
            array: array.into(),
            store: Mutex::new(None),
        }
    }

    pub(crate) fn array(&self) -> &str {
        &self.array
    }

    pub(crate) fn store(&self) -> Option<DataStoreRef> {
        self.store.lock().clone()
    }

    pub(crate) fn get_or_init(&self, init: impl FnOnce() -> Result<DataStoreRef>) -> Result<DataStoreRef> {
        let mut store = self.store.lock();
        if let Some(store) = store.as_ref() {
            return Ok(store.clone());
        }
        let s = init()?;
        *store = Some(s.clone());
        Ok(s)
    }

    pub(crate) fn take(&self) -> Option<DataStoreRef> {
        self.store.lock().take()
    }

    pub(crate) fn guid(&self) -> Option<Guid> {
        self.store.lock().as_ref().map(|store| store.guid())
    }
}

/// Identity of an initialized chunk.
#[derive(Debug)]
pub(crate) struct ChunkIdentity {
    pub(crate) address: Address,
    pub(crate) desc: Arc<ArrayDesc>,
    pub(crate) slot: Arc<SpillSlot>,
    pub(crate) bitmap: Option<Arc<Chunk>>,
}

/// A chunk of one attribute of an array, the unit of residency, spill and pinning.
///
/// The pin count, the size at last unpin and the LRU link are only mutated under the cache lock. The bytes, the logical
/// size and the disk span are guarded by the chunk lock, which is always taken after the cache lock.
pub struct Chunk {
    identity: OnceLock<ChunkIdentity>,
    link: LinkedListAtomicLink,

    pins: AtomicU32,
    size_at_last_unpin: AtomicUsize,
    flags: AtomicU64,

    compression: Mutex<CompressionMethod>,
    data: RwLock<ChunkData>,
}

intrusive_adapter! { pub(crate) LruAdapter = Arc<Chunk>: Chunk { link: LinkedListAtomicLink } }

impl Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Chunk");
        if let Some(identity) = self.identity.get() {
            s.field("array", &identity.slot.array()).field("address", &identity.address);
        }
        s.field("pins", &self.pins())
            .field("size_at_last_unpin", &self.size_at_last_unpin())
            .field("flags", &self.flags())
            .finish()
    }
}

impl Chunk {
    /// Create an uninitialized placeholder.
    pub(crate) fn new() -> Self {
        Self {
            identity: OnceLock::new(),
            link: LinkedListAtomicLink::new(),
            pins: AtomicU32::new(0),
            size_at_last_unpin: AtomicUsize::new(0),
            flags: AtomicU64::new(0),
            compression: Mutex::new(CompressionMethod::None),
            data: RwLock::new(ChunkData::default()),
        }
    }

    /// Set the identity of the chunk.
    ///
    /// # Panics
    ///
    /// Panics if the chunk has been initialized.
    pub(crate) fn initialize(&self, identity: ChunkIdentity, compression: CompressionMethod) {
        let address = identity.address.clone();
        if self.identity.set(identity).is_err() {
            panic!("chunk {address} has been initialized twice");
        }
        *self.compression.lock() = compression;
    }

    /// Check if the chunk has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.identity.get().is_some()
    }

    pub(crate) fn identity(&self) -> &ChunkIdentity {
        self.identity.get().expect("chunk is not initialized")
    }

    /// Address of the chunk.
    pub fn address(&self) -> &Address {
        &self.identity().address
    }

    /// Descriptor of the owning array.
    pub fn desc(&self) -> &Arc<ArrayDesc> {
        &self.identity().desc
    }

    /// The empty bitmap chunk at the same coordinates, if the array has an empty bitmap attribute.
    pub fn bitmap(&self) -> Option<&Arc<Chunk>> {
        self.identity().bitmap.as_ref()
    }

    pub(crate) fn slot(&self) -> &Arc<SpillSlot> {
        &self.identity().slot
    }

    /// Compression method of the chunk.
    pub fn compression(&self) -> CompressionMethod {
        *self.compression.lock()
    }

    pub(crate) fn set_compression(&self, compression: CompressionMethod) {
        *self.compression.lock() = compression;
    }

    /// Current pin count.
    pub fn pins(&self) -> u32 {
        self.pins.load(Ordering::Acquire)
    }

    pub(crate) fn set_pins(&self, pins: u32) {
        self.pins.store(pins, Ordering::Release);
    }

    /// Logical size recorded the last time the pin count reached zero.
    pub fn size_at_last_unpin(&self) -> usize {
        self.size_at_last_unpin.load(Ordering::Acquire)
    }

    pub(crate) fn set_size_at_last_unpin(&self, size: usize) {
        self.size_at_last_unpin.store(size, Ordering::Release);
    }

    /// Current logical size.
    pub fn size(&self) -> usize {
        self.data.read().size
    }

    /// Check if the bytes are in memory.
    pub fn is_resident(&self) -> bool {
        self.data.read().body.is_resident()
    }

    /// Location in the data store, if the chunk has ever been spilled.
    pub fn disk_span(&self) -> Option<DiskSpan> {
        self.data.read().disk
    }

    /// Check if the chunk is on the LRU queue.
    pub fn is_in_lru(&self) -> bool {
        self.link.is_linked()
    }

    pub(crate) fn data(&self) -> &RwLock<ChunkData> {
        &self.data
    }

    /// Get all flags.
    pub fn flags(&self) -> ChunkFlags {
        ChunkFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Check if the chunk has been changed since its last write to the data store.
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(ChunkFlags::DIRTY)
    }

    /// Check if the chunk has been deleted or torn down.
    pub fn is_retired(&self) -> bool {
        self.flags().contains(ChunkFlags::RETIRED)
    }

    pub(crate) fn set_dirty(&self, val: bool) {
        self.set_flags(ChunkFlags::DIRTY, val);
    }

    pub(crate) fn set_retired(&self) {
        self.set_flags(ChunkFlags::RETIRED, true);
    }

    fn set_flags(&self, flags: ChunkFlags, val: bool) {
        if val {
            self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
        } else {
            self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use chunk_cache_common::schema::{AttributeDesc, DimensionDesc};

    use super::*;

    fn identity() -> ChunkIdentity {
        let desc = ArrayDesc::new("a", vec![AttributeDesc::new(0, "v")], vec![DimensionDesc::new("i", 0, 9, 10)]);
        ChunkIdentity {
            address: Address::new(0, vec![0]),
            desc: Arc::new(desc),
            slot: Arc::new(SpillSlot::new("a")),
            bitmap: None,
        }
    }

    #[test]
    fn test_chunk_flags() {
        let chunk = Chunk::new();
        assert!(!chunk.is_initialized());
        chunk.initialize(identity(), CompressionMethod::Zlib);
        assert_eq!(chunk.compression(), CompressionMethod::Zlib);
        assert_eq!(chunk.address(), &Address::new(0, vec![0]));

        chunk.set_dirty(true);
        chunk.set_retired();
        assert!(chunk.is_dirty() && chunk.is_retired());
        chunk.set_dirty(false);
        assert_eq!(chunk.flags(), ChunkFlags::RETIRED);
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn test_initialize_twice() {
        let chunk = Chunk::new();
        chunk.initialize(identity(), CompressionMethod::None);
        chunk.initialize(identity(), CompressionMethod::None);
    }
}

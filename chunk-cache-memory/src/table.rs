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

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use chunk_cache_common::{
    error::{Error, Result},
    schema::{Address, ArrayDesc, AttributeId, CompressionMethod, Coordinates},
    session::{NoSession, Session},
};
use chunk_cache_storage::Guid;
use parking_lot::Mutex;

use crate::{
    cache::SharedMemCache,
    chunk::{Chunk, ChunkIdentity, SpillSlot},
    handle::ChunkHandle,
    iterator::ChunkIterator,
};

/// All chunks of one in-memory array.
///
/// Chunks are created on first touch and live until they are deleted or the table is dropped. Dropping the table
/// deregisters all of its chunks from the cache and removes its data store.
pub struct ChunkTable {
    desc: Arc<ArrayDesc>,
    cache: Arc<SharedMemCache>,
    session: Arc<dyn Session>,
    slot: Arc<SpillSlot>,
    chunks: Mutex<BTreeMap<Address, Arc<Chunk>>>,
}

impl Debug for ChunkTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkTable")
            .field("array", &self.desc.name())
            .field("chunks", &self.len())
            .finish()
    }
}

impl ChunkTable {
    /// Create an empty table of the array that is always valid.
    pub fn new(desc: impl Into<Arc<ArrayDesc>>, cache: Arc<SharedMemCache>) -> Self {
        Self::with_session(desc, cache, Arc::new(NoSession))
    }

    /// Create an empty table of the array owned by the session.
    ///
    /// Every pin performed by the table fails once the session is invalid.
    pub fn with_session(desc: impl Into<Arc<ArrayDesc>>, cache: Arc<SharedMemCache>, session: Arc<dyn Session>) -> Self {
        let desc = desc.into();
        let slot = Arc::new(SpillSlot::new(desc.name()));
        Self {
            desc,
            cache,
            session,
            slot,
            chunks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Descriptor of the array.
    pub fn desc(&self) -> &Arc<ArrayDesc> {
        &self.desc
    }

    /// The cache the chunks are accounted in.
    pub fn cache(&self) -> &Arc<SharedMemCache> {
        &self.cache
    }

    /// Count of chunks, of all attributes.
    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    /// Check if the table has no chunk.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Guid of the data store of the array, if any chunk has been spilled.
    pub fn store_guid(&self) -> Option<Guid> {
        self.slot.guid()
    }

    /// Get the chunk at the address without pinning it.
    pub fn peek(&self, address: &Address) -> Option<Arc<Chunk>> {
        self.chunks.lock().get(address).cloned()
    }

    /// Get the pinned chunk at the address, create it on first access.
    ///
    /// The coordinates are snapped to the origin of the chunk that contains them.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "chunk_cache::memory::table::get_or_create"))]
    pub fn get_or_create(&self, address: &Address) -> Result<ChunkHandle> {
        let address = self.normalize(address)?;
        let mut chunks = self.chunks.lock();
        let chunk = self.lookup_or_insert(&mut chunks, &address)?;
        self.pin(chunk)
    }

    /// Create the chunk at the address and pin it.
    ///
    /// Fails with [`chunk_cache_common::error::ErrorKind::ChunkAlreadyExists`] if the chunk exists, unless it is a
    /// chunk of the empty bitmap attribute, which may have been created along with a chunk of another attribute.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "chunk_cache::memory::table::new_chunk"))]
    pub fn new_chunk(&self, address: &Address) -> Result<ChunkHandle> {
        self.new_chunk_inner(address, None)
    }

    /// Create the chunk at the address with the compression method and pin it.
    pub fn new_chunk_with_compression(&self, address: &Address, compression: CompressionMethod) -> Result<ChunkHandle> {
        self.new_chunk_inner(address, Some(compression))
    }

    /// Delete the chunk of the handle.
    ///
    /// # Panics
    ///
    /// Panics if the chunk is pinned by other handles too, or if it does not belong to this table. The handle is
    /// unpinned on unwind.
    pub fn delete_chunk(&self, handle: ChunkHandle) -> Result<()> {
        let mut chunks = self.chunks.lock();
        let address = handle.address().clone();
        let owned = chunks.get(&address).is_some_and(|c| Arc::ptr_eq(c, handle.chunk()));
        if !owned {
            drop(chunks);
            panic!("delete chunk {address} that does not belong to array {}", self.desc.name());
        }
        let chunk = handle.into_chunk();
        let res = self.cache.delete_chunk(&chunk);
        chunks.remove(&address);
        tracing::trace!("[table]: array {} deleted chunk {address}", self.desc.name());
        res
    }

    /// Iterate the chunks of one attribute in address order.
    pub fn iterate(&self, attribute: AttributeId) -> ChunkIterator<'_> {
        ChunkIterator::new(self, attribute)
    }

    /// The first address after `after` (or the first address if `None`) of the attribute.
    pub(crate) fn next_address(&self, attribute: AttributeId, after: Option<&Address>) -> Option<Address> {
        use std::ops::Bound;

        let chunks = self.chunks.lock();
        let lower = match after {
            Some(address) => Bound::Excluded(address),
            None => Bound::Unbounded,
        };
        chunks
            .range::<Address, _>((lower, Bound::Unbounded))
            .map(|(address, _)| address)
            .find(|address| address.attribute == attribute)
            .cloned()
    }

    /// Pin the chunk at the address if it exists.
    pub(crate) fn pin_existing(&self, address: &Address) -> Result<Option<ChunkHandle>> {
        let chunks = self.chunks.lock();
        chunks.get(address).cloned().map(|chunk| self.pin(chunk)).transpose()
    }

    fn new_chunk_inner(&self, address: &Address, compression: Option<CompressionMethod>) -> Result<ChunkHandle> {
        let address = self.normalize(address)?;
        let mut chunks = self.chunks.lock();
        if chunks.contains_key(&address) && !self.is_empty_bitmap(address.attribute) {
            return Err(Error::already_exists(self.desc.name(), address.attribute, &address.coords));
        }
        let chunk = self.lookup_or_insert(&mut chunks, &address)?;
        if let Some(compression) = compression {
            chunk.set_compression(compression);
        }
        self.pin(chunk)
    }

    fn normalize(&self, address: &Address) -> Result<Address> {
        if self.desc.attribute(address.attribute).is_none() || !self.desc.contains(&address.coords) {
            return Err(Error::out_of_bounds(self.desc.name(), &address.coords)
                .with_context("attribute", address.attribute));
        }
        let mut coords: Coordinates = address.coords.clone();
        self.desc.chunk_position_for(&mut coords);
        Ok(Address::new(address.attribute, coords))
    }

    fn is_empty_bitmap(&self, attribute: AttributeId) -> bool {
        self.desc
            .empty_bitmap_attribute()
            .is_some_and(|bitmap| bitmap.id == attribute)
    }

    fn pin(&self, chunk: Arc<Chunk>) -> Result<ChunkHandle> {
        self.session.validate()?;
        ChunkHandle::pin(chunk, self.cache.clone())
    }

    /// Must be called with the table lock held.
    fn lookup_or_insert(&self, chunks: &mut BTreeMap<Address, Arc<Chunk>>, address: &Address) -> Result<Arc<Chunk>> {
        if let Some(chunk) = chunks.get(address) {
            return Ok(chunk.clone());
        }

        let bitmap = match self.desc.empty_bitmap_attribute() {
            Some(bitmap) if bitmap.id != address.attribute => {
                let bitmap_address = Address::new(bitmap.id, address.coords.clone());
                let bitmap = self.lookup_or_insert(chunks, &bitmap_address)?;
                // Materialize the bitmap chunk before the chunk that refers to it.
                self.pin(bitmap.clone())?.release()?;
                Some(bitmap)
            }
            _ => None,
        };

        let compression = self
            .desc
            .attribute(address.attribute)
            .map(|attr| attr.default_compression)
            .unwrap_or_default();
        let chunk = Arc::new(Chunk::new());
        chunk.initialize(
            ChunkIdentity {
                address: address.clone(),
                desc: self.desc.clone(),
                slot: self.slot.clone(),
                bitmap,
            },
            compression,
        );
        chunks.insert(address.clone(), chunk.clone());
        tracing::trace!("[table]: array {} created chunk {address}", self.desc.name());
        Ok(chunk)
    }
}

impl Drop for ChunkTable {
    fn drop(&mut self) {
        let chunks = std::mem::take(self.chunks.get_mut());
        self.cache.teardown_array(&self.slot, chunks.values());
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chunk_cache_common::{
        error::ErrorKind,
        schema::{AttributeDesc, DimensionDesc},
        session::SessionFlag,
    };
    use chunk_cache_storage::MemStoreRegistry;

    use super::*;

    fn desc() -> ArrayDesc {
        ArrayDesc::new(
            "t",
            vec![
                AttributeDesc::new(0, "v"),
                AttributeDesc::new(1, "w").with_compression(CompressionMethod::Zlib),
            ],
            vec![DimensionDesc::new("i", 0, 99, 10), DimensionDesc::new("j", 0, 99, 10)],
        )
        .with_empty_bitmap()
    }

    fn cache() -> Arc<SharedMemCache> {
        Arc::new(SharedMemCache::new(1 << 20, Arc::new(MemStoreRegistry::default())))
    }

    #[test]
    fn test_get_or_create() {
        let table = ChunkTable::new(desc(), cache());

        let handle = table.get_or_create(&Address::new(1, vec![15, 27])).unwrap();
        assert_eq!(handle.address(), &Address::new(1, vec![10, 20]));
        assert_eq!(handle.compression(), CompressionMethod::Zlib);

        // The empty bitmap chunk is created along with it.
        let bitmap = handle.bitmap().unwrap();
        assert_eq!(bitmap.address(), &Address::new(2, vec![10, 20]));
        assert_eq!(bitmap.compression(), CompressionMethod::RunLength);
        assert_eq!(bitmap.pins(), 0);
        assert_eq!(table.len(), 2);

        let same = table.get_or_create(&Address::new(1, vec![19, 20])).unwrap();
        assert!(Arc::ptr_eq(same.chunk(), handle.chunk()));
        assert_eq!(handle.pins(), 2);

        let bitmap = handle.pin_bitmap().unwrap().unwrap();
        assert!(bitmap.bitmap().is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_out_of_bounds() {
        let table = ChunkTable::new(desc(), cache());
        for address in [
            Address::new(0, vec![100, 0]),
            Address::new(0, vec![0, -1]),
            Address::new(0, vec![0]),
            Address::new(3, vec![0, 0]),
        ] {
            let err = table.get_or_create(&address).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ChunkOutOfBounds);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_new_chunk() {
        let table = ChunkTable::new(desc(), cache());

        let handle = table.new_chunk(&Address::new(0, vec![0, 0])).unwrap();
        drop(handle);
        let err = table.new_chunk(&Address::new(0, vec![5, 5])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChunkAlreadyExists);

        // The implicitly created empty bitmap chunk may be created again.
        let bitmap = table.new_chunk(&Address::new(2, vec![0, 0])).unwrap();
        assert_eq!(table.len(), 2);
        drop(bitmap);

        let handle = table
            .new_chunk_with_compression(&Address::new(1, vec![0, 0]), CompressionMethod::Bzlib)
            .unwrap();
        assert_eq!(handle.compression(), CompressionMethod::Bzlib);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_invalid_session() {
        let session = Arc::new(SessionFlag::new(42));
        let table = ChunkTable::with_session(desc(), cache(), session.clone());

        let handle = table.get_or_create(&Address::new(0, vec![0, 0])).unwrap();
        session.cancel();
        let err = table.get_or_create(&Address::new(0, vec![0, 0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSession);

        // Unpin never checks the session.
        handle.release().unwrap();
        assert_eq!(table.peek(&Address::new(0, vec![0, 0])).unwrap().pins(), 0);
    }

    #[test]
    fn test_delete_foreign_chunk() {
        let cache = cache();
        let a = ChunkTable::new(desc(), cache.clone());
        let b = ChunkTable::new(desc(), cache.clone());
        let address = Address::new(0, vec![0, 0]);

        let handle = b.get_or_create(&address).unwrap();
        handle.set_data(&[7; 16]);
        let chunk = handle.chunk().clone();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| a.delete_chunk(handle)));
        assert!(res.is_err());

        // The pin of the handle is released on unwind.
        assert_eq!(chunk.pins(), 0);
        assert!(!chunk.is_retired());
        assert!(chunk.is_in_lru());
        assert_eq!(cache.resident_bytes(), 16);
        assert!(cache.check_invariant());
    }

    #[test]
    fn test_concurrent_get_or_create() {
        let table = Arc::new(ChunkTable::new(desc(), cache()));

        let handles = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    (0..10)
                        .map(|i| table.get_or_create(&Address::new(0, vec![i * 10, 0])).unwrap().chunk().clone())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        let chunks = handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>();

        for other in &chunks[1..] {
            for (a, b) in chunks[0].iter().zip(other) {
                assert!(Arc::ptr_eq(a, b));
            }
        }
        assert_eq!(table.len(), 20);
    }
}

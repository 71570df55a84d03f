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

use chunk_cache_common::error::Result;

/// Unique id of a data store, unique within one registry.
pub type Guid = u64;

/// Per-array byte store used as the spill target of evicted chunks.
///
/// Space must be allocated with [`DataStore::allocate_space`] before it can be written with
/// [`DataStore::write_data`]. Every written chunk is prefixed with a header of [`DataStore::overhead`] bytes, which is
/// accounted in the allocated size.
pub trait DataStore: Send + Sync + Debug + 'static {
    /// Unique id of the store.
    fn guid(&self) -> Guid;

    /// Find space for a chunk of `size` bytes.
    ///
    /// Returns the offset and the allocated size, which is at least `size + overhead()`.
    fn allocate_space(&self, size: usize) -> Result<(u64, usize)>;

    /// Return the space at `offset` to the store.
    fn free_chunk(&self, offset: u64, allocated: usize) -> Result<()>;

    /// Write a chunk into space returned by [`DataStore::allocate_space`].
    fn write_data(&self, offset: u64, data: &[u8], allocated: usize) -> Result<()>;

    /// Read `buf.len()` bytes of the chunk at `offset`.
    ///
    /// Fails with [`chunk_cache_common::error::ErrorKind::ChunkCorrupted`] if the chunk header is not valid.
    fn read_data(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Bytes of bookkeeping per chunk.
    fn overhead(&self) -> usize;

    /// Make written data durable.
    fn flush(&self) -> Result<()>;
}

/// Shared data store.
pub type DataStoreRef = Arc<dyn DataStore>;

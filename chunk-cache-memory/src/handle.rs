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

use std::{fmt::Debug, ops::Deref, sync::Arc};

use chunk_cache_common::error::Result;

use crate::{
    cache::SharedMemCache,
    chunk::{Body, Chunk},
};

/// A pin on a chunk.
///
/// The chunk stays resident as long as the handle lives. Dropping the handle unpins the chunk, errors of the eviction
/// triggered by the unpin are logged. Use [`ChunkHandle::release`] to observe them.
///
/// Concurrent readers and writers of the same chunk are serialized by the chunk lock. Callers that hold several
/// handles must not pin or unpin chunks from inside [`ChunkHandle::read`] or [`ChunkHandle::write`].
pub struct ChunkHandle {
    chunk: Arc<Chunk>,
    cache: Arc<SharedMemCache>,
    released: bool,
}

impl Debug for ChunkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkHandle").field("chunk", &self.chunk).finish()
    }
}

impl ChunkHandle {
    /// Wrap a chunk that has been pinned.
    pub(crate) fn new(chunk: Arc<Chunk>, cache: Arc<SharedMemCache>) -> Self {
        Self {
            chunk,
            cache,
            released: false,
        }
    }

    /// Pin the chunk of an existing handle.
    pub(crate) fn pin(chunk: Arc<Chunk>, cache: Arc<SharedMemCache>) -> Result<Self> {
        cache.pin(&chunk)?;
        Ok(Self::new(chunk, cache))
    }

    /// Get the pinned chunk.
    pub fn chunk(&self) -> &Arc<Chunk> {
        &self.chunk
    }

    /// Pin the chunk once more.
    pub fn try_clone(&self) -> Result<Self> {
        Self::pin(self.chunk.clone(), self.cache.clone())
    }

    /// Pin the empty bitmap chunk at the same coordinates.
    pub fn pin_bitmap(&self) -> Result<Option<Self>> {
        self.chunk
            .bitmap()
            .map(|bitmap| Self::pin(bitmap.clone(), self.cache.clone()))
            .transpose()
    }

    /// Read the bytes of the chunk.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.chunk.data().read();
        match &data.body {
            Body::Resident(buf) => f(buf),
            _ => f(&[]),
        }
    }

    /// Copy the bytes of the chunk.
    pub fn to_vec(&self) -> Vec<u8> {
        self.read(|buf| buf.to_vec())
    }

    /// Modify the bytes of the chunk and mark it dirty.
    ///
    /// The logical size of the chunk follows the length of the buffer. A buffer left empty is freed.
    pub fn write<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        let mut data = self.chunk.data().write();
        let mut buf = match std::mem::take(&mut data.body) {
            Body::Resident(buf) => buf,
            _ => Vec::new(),
        };
        let res = f(&mut buf);
        data.size = buf.len();
        data.body = if buf.is_empty() { Body::Empty } else { Body::Resident(buf) };
        self.chunk.set_dirty(true);
        res
    }

    /// Replace the bytes of the chunk.
    pub fn set_data(&self, bytes: &[u8]) {
        self.write(|buf| {
            buf.clear();
            buf.extend_from_slice(bytes);
        })
    }

    /// Drop the bytes of the chunk.
    pub fn clear(&self) {
        self.write(|buf| *buf = Vec::new())
    }

    /// Unpin the chunk and return the error of the eviction it triggered, if any.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.cache.unpin(&self.chunk)
    }

    pub(crate) fn into_chunk(mut self) -> Arc<Chunk> {
        self.released = true;
        self.chunk.clone()
    }
}

impl Deref for ChunkHandle {
    type Target = Chunk;

    fn deref(&self) -> &Self::Target {
        &self.chunk
    }
}

impl Drop for ChunkHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.cache.unpin(&self.chunk) {
            tracing::error!("[handle]: eviction failed on unpin of chunk {}: {e}", self.chunk.address());
        }
    }
}

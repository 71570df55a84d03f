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

use chunk_cache_common::error::{Error, ErrorKind, Result};
use parking_lot::Mutex;

use crate::{
    allocator::BuddyAllocator,
    serde::ChunkHeader,
    store::{DataStore, Guid},
};

#[derive(Debug)]
struct Inner {
    allocator: BuddyAllocator,
    data: Vec<u8>,
}

/// A data store that keeps spilled chunks in a byte vector.
///
/// Uses the same allocator and chunk layout as [`crate::file::FsDataStore`].
#[derive(Debug)]
pub struct MemDataStore {
    guid: Guid,
    inner: Mutex<Inner>,
}

impl MemDataStore {
    /// Create an empty store.
    pub fn new(guid: Guid, min_alloc_size: usize) -> Self {
        Self {
            guid,
            inner: Mutex::new(Inner {
                allocator: BuddyAllocator::new(min_alloc_size),
                data: vec![],
            }),
        }
    }

    /// Bytes written so far, including holes.
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// Check if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataStore for MemDataStore {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn allocate_space(&self, size: usize) -> Result<(u64, usize)> {
        let (offset, allocated) = self
            .inner
            .lock()
            .allocator
            .allocate((size + ChunkHeader::serialized_len()) as u64);
        Ok((offset, allocated as usize))
    }

    fn free_chunk(&self, offset: u64, allocated: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let start = offset as usize;
        let end = start + ChunkHeader::serialized_len();
        if inner.data.len() < end {
            inner.data.resize(end, 0);
        }
        ChunkHeader::free(allocated as u64).write(&mut inner.data[start..end]);
        inner.allocator.free(offset, allocated as u64);
        Ok(())
    }

    fn write_data(&self, offset: u64, data: &[u8], allocated: usize) -> Result<()> {
        assert!(
            data.len() + ChunkHeader::serialized_len() <= allocated,
            "chunk of {} bytes does not fit into {allocated} bytes",
            data.len()
        );

        let mut inner = self.inner.lock();
        let start = offset as usize;
        let end = start + ChunkHeader::serialized_len() + data.len();
        if inner.data.len() < end {
            inner.data.resize(end, 0);
        }
        let (mut header, body) = inner.data[start..end].split_at_mut(ChunkHeader::serialized_len());
        ChunkHeader::used(allocated as u64).write(&mut header);
        body.copy_from_slice(data);
        Ok(())
    }

    fn read_data(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock();
        let start = offset as usize;
        let end = start + ChunkHeader::serialized_len() + buf.len();
        if inner.data.len() < end {
            return Err(Error::new(ErrorKind::Io, "read beyond the end of the store")
                .with_context("store", self.guid)
                .with_context("offset", offset)
                .with_context("len", buf.len()));
        }
        let (header, body) = inner.data[start..end].split_at(ChunkHeader::serialized_len());
        if !ChunkHeader::read(header).is_used() {
            return Err(Error::corrupted(self.guid, offset));
        }
        buf.copy_from_slice(body);
        Ok(())
    }

    fn overhead(&self) -> usize {
        ChunkHeader::serialized_len()
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_store_write_read() {
        let store = MemDataStore::new(1, 1024);
        assert!(store.is_empty());

        let (offset, allocated) = store.allocate_space(3000).unwrap();
        assert_eq!(allocated, 4096);
        store.write_data(offset, &[42; 3000], allocated).unwrap();

        let mut buf = vec![0; 3000];
        store.read_data(offset, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 42));

        // Shorter reads are allowed, the chunk size is tracked by the caller.
        let mut buf = vec![0; 10];
        store.read_data(offset, &mut buf).unwrap();
        assert_eq!(buf, vec![42; 10]);

        // Never written, the header is all zeros.
        let (o, _) = store.allocate_space(10).unwrap();
        assert!(o < offset);
        let mut buf = vec![0; 10];
        assert_eq!(store.read_data(o, &mut buf).unwrap_err().kind(), ErrorKind::ChunkCorrupted);

        let mut buf = vec![0; 10];
        assert_eq!(store.read_data(1 << 20, &mut buf).unwrap_err().kind(), ErrorKind::Io);
    }

    #[test]
    fn test_mem_store_free_stamps_header() {
        let store = MemDataStore::new(1, 1024);
        let (offset, allocated) = store.allocate_space(100).unwrap();
        store.write_data(offset, &[1; 100], allocated).unwrap();

        store.free_chunk(offset, allocated).unwrap();
        let header = ChunkHeader::read(&store.inner.lock().data[offset as usize..]);
        assert!(header.is_free());
        assert_eq!(header.allocated, allocated as u64);

        let mut buf = vec![0; 100];
        assert_eq!(store.read_data(offset, &mut buf).unwrap_err().kind(), ErrorKind::ChunkCorrupted);
    }
}

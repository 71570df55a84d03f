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
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use chunk_cache_common::error::{Error, Result};
use parking_lot::Mutex;

use crate::{
    allocator::BuddyAllocator,
    serde::ChunkHeader,
    store::{DataStore, Guid},
};

#[cfg(target_family = "unix")]
fn pwrite_all(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(target_family = "windows")]
fn pwrite_all(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let written = file.seek_write(buf, offset)?;
        if written == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        buf = &buf[written..];
        offset += written as u64;
    }
    Ok(())
}

#[cfg(target_family = "unix")]
fn pread_exact(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(target_family = "windows")]
fn pread_exact(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let read = file.seek_read(buf, offset)?;
        if read == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf = &mut buf[read..];
        offset += read as u64;
    }
    Ok(())
}

/// A data store upon a single file `<dir>/<guid>.data`.
///
/// Space is managed by a [`BuddyAllocator`]. The free lists only live in memory, stores are not reopened across
/// process restarts.
#[derive(Debug)]
pub struct FsDataStore {
    guid: Guid,
    path: PathBuf,
    file: File,
    allocator: Mutex<BuddyAllocator>,
    dirty: AtomicBool,
    remove_on_close: AtomicBool,
}

impl FsDataStore {
    /// Create or truncate the data file of store `guid` under `dir`.
    pub fn open(dir: impl AsRef<Path>, guid: Guid, min_alloc_size: usize) -> Result<Self> {
        let path = Self::path_for(dir, guid);
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io_error(e).with_context("path", path.display()))?;

        tracing::debug!("[fs store]: opened store {guid} at {path:?}");

        Ok(Self {
            guid,
            path,
            file,
            allocator: Mutex::new(BuddyAllocator::new(min_alloc_size)),
            dirty: AtomicBool::new(false),
            remove_on_close: AtomicBool::new(false),
        })
    }

    /// Path of the data file of store `guid` under `dir`.
    pub fn path_for(dir: impl AsRef<Path>, guid: Guid) -> PathBuf {
        dir.as_ref().join(format!("{guid}.data"))
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the store address space, free blocks included.
    pub fn allocated_size(&self) -> u64 {
        self.allocator.lock().allocated_size()
    }

    /// Total size of the free blocks.
    pub fn free_bytes(&self) -> u64 {
        self.allocator.lock().free_bytes()
    }

    /// Delete the data file when the store is dropped.
    pub(crate) fn remove_on_close(&self) {
        self.remove_on_close.store(true, Ordering::Release);
    }
}

impl Drop for FsDataStore {
    fn drop(&mut self) {
        if !self.remove_on_close.load(Ordering::Acquire) {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("[fs store]: removed store {} at {:?}", self.guid, self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("[fs store]: failed to remove store {} at {:?}: {e}", self.guid, self.path),
        }
    }
}

impl DataStore for FsDataStore {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn allocate_space(&self, size: usize) -> Result<(u64, usize)> {
        let (offset, allocated) = self
            .allocator
            .lock()
            .allocate((size + ChunkHeader::serialized_len()) as u64);
        tracing::trace!("[fs store]: store {} allocated {allocated} bytes at {offset} for {size} bytes", self.guid);
        Ok((offset, allocated as usize))
    }

    fn free_chunk(&self, offset: u64, allocated: usize) -> Result<()> {
        let mut header = Vec::with_capacity(ChunkHeader::serialized_len());
        ChunkHeader::free(allocated as u64).write(&mut header);
        // The block stays allocated if it cannot be stamped.
        pwrite_all(&self.file, &header, offset).map_err(|e| {
            Error::io_error(e)
                .with_context("path", self.path.display())
                .with_context("offset", offset)
        })?;
        self.dirty.store(true, Ordering::Release);

        self.allocator.lock().free(offset, allocated as u64);
        tracing::trace!("[fs store]: store {} freed {allocated} bytes at {offset}", self.guid);
        Ok(())
    }

    #[cfg_attr(feature = "tracing", fastrace::trace(name = "chunk_cache::storage::file::write_data"))]
    fn write_data(&self, offset: u64, data: &[u8], allocated: usize) -> Result<()> {
        assert!(
            data.len() + ChunkHeader::serialized_len() <= allocated,
            "chunk of {} bytes does not fit into {allocated} bytes",
            data.len()
        );

        let mut header = Vec::with_capacity(ChunkHeader::serialized_len());
        ChunkHeader::used(allocated as u64).write(&mut header);

        let res = pwrite_all(&self.file, &header, offset)
            .and_then(|_| pwrite_all(&self.file, data, offset + header.len() as u64));
        res.map_err(|e| {
            Error::io_error(e)
                .with_context("path", self.path.display())
                .with_context("offset", offset)
        })?;

        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    #[cfg_attr(feature = "tracing", fastrace::trace(name = "chunk_cache::storage::file::read_data"))]
    fn read_data(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut header = [0u8; ChunkHeader::serialized_len()];
        let res = pread_exact(&self.file, &mut header, offset)
            .and_then(|_| pread_exact(&self.file, buf, offset + header.len() as u64));
        res.map_err(|e| {
            Error::io_error(e)
                .with_context("path", self.path.display())
                .with_context("offset", offset)
        })?;

        if !ChunkHeader::read(&header[..]).is_used() {
            return Err(Error::corrupted(self.path.display(), offset));
        }
        Ok(())
    }

    fn overhead(&self) -> usize {
        ChunkHeader::serialized_len()
    }

    fn flush(&self) -> Result<()> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.file.sync_data() {
                self.dirty.store(true, Ordering::Release);
                return Err(Error::io_error(e).with_context("path", self.path.display()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chunk_cache_common::error::ErrorKind;

    use super::*;

    #[test_log::test]
    fn test_fs_store_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDataStore::open(dir.path(), 7, 4096).unwrap();
        assert_eq!(store.path(), dir.path().join("7.data"));

        let a = vec![b'a'; 10000];
        let b = vec![b'b'; 100];

        let (oa, la) = store.allocate_space(a.len()).unwrap();
        let (ob, lb) = store.allocate_space(b.len()).unwrap();
        assert!(la >= a.len() + store.overhead());
        assert!(lb >= b.len() + store.overhead());

        store.write_data(oa, &a, la).unwrap();
        store.write_data(ob, &b, lb).unwrap();
        store.flush().unwrap();

        let mut buf = vec![0; a.len()];
        store.read_data(oa, &mut buf).unwrap();
        assert_eq!(buf, a);
        let mut buf = vec![0; b.len()];
        store.read_data(ob, &mut buf).unwrap();
        assert_eq!(buf, b);

        // A freed block is stamped and can no longer be read.
        store.free_chunk(oa, la).unwrap();
        let mut header = [0u8; ChunkHeader::serialized_len()];
        pread_exact(&store.file, &mut header, oa).unwrap();
        let header = ChunkHeader::read(&header[..]);
        assert!(header.is_free());
        assert_eq!(header.allocated, la as u64);
        let mut buf = vec![0; a.len()];
        assert_eq!(store.read_data(oa, &mut buf).unwrap_err().kind(), ErrorKind::ChunkCorrupted);

        // Reuse the freed space for a chunk of the same size.
        let (oc, lc) = store.allocate_space(a.len()).unwrap();
        assert_eq!((oc, lc), (oa, la));
    }

    #[test]
    fn test_fs_store_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDataStore::open(dir.path(), 1, 4096).unwrap();

        let (offset, allocated) = store.allocate_space(16).unwrap();
        store.write_data(offset, &[1; 16], allocated).unwrap();
        pwrite_all(&store.file, &[0; 8], offset).unwrap();

        let mut buf = vec![0; 16];
        let err = store.read_data(offset, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChunkCorrupted);
    }

    #[test]
    fn test_fs_store_remove_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDataStore::open(dir.path(), 3, 4096).unwrap();
        let path = store.path().to_path_buf();
        drop(store);
        assert!(path.exists());

        let store = FsDataStore::open(dir.path(), 3, 4096).unwrap();
        store.remove_on_close();
        drop(store);
        assert!(!path.exists());
    }
}

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

use chunk_cache_common::{
    error::{Error, Result},
    schema::{Address, AttributeId, CompressionMethod, Coordinate, Coordinates},
};

use crate::{handle::ChunkHandle, table::ChunkTable};

/// Ordered cursor over the chunks of one attribute of a [`ChunkTable`].
///
/// The cursor remembers an address, not a position in the table, so chunks created or deleted elsewhere never
/// invalidate it. A new iterator is positioned at the first chunk.
#[derive(Debug)]
pub struct ChunkIterator<'a> {
    table: &'a ChunkTable,
    attribute: AttributeId,
    current: Option<Address>,
}

impl<'a> ChunkIterator<'a> {
    pub(crate) fn new(table: &'a ChunkTable, attribute: AttributeId) -> Self {
        let mut iter = Self {
            table,
            attribute,
            current: None,
        };
        iter.reset();
        iter
    }

    /// The attribute the iterator walks.
    pub fn attribute(&self) -> AttributeId {
        self.attribute
    }

    /// Check if the iterator is past the last chunk.
    pub fn end(&self) -> bool {
        self.current.is_none()
    }

    /// Move to the next chunk in address order.
    pub fn next(&mut self) {
        if let Some(current) = self.current.take() {
            self.current = self.table.next_address(self.attribute, Some(&current));
        }
    }

    /// Move to the chunk that contains the coordinates.
    ///
    /// Returns `false` and moves past the last chunk if the coordinates are out of bounds or no such chunk exists.
    pub fn seek(&mut self, coords: &[Coordinate]) -> bool {
        self.current = None;
        if !self.table.desc().contains(coords) {
            return false;
        }
        let mut coords: Coordinates = coords.to_vec();
        self.table.desc().chunk_position_for(&mut coords);
        let address = Address::new(self.attribute, coords);
        if self.table.peek(&address).is_none() {
            return false;
        }
        self.current = Some(address);
        true
    }

    /// Move back to the first chunk.
    pub fn reset(&mut self) {
        self.current = self.table.next_address(self.attribute, None);
    }

    /// Coordinates of the current chunk.
    pub fn position(&self) -> Result<Coordinates> {
        self.current
            .as_ref()
            .map(|address| address.coords.clone())
            .ok_or_else(|| Error::no_current_chunk(self.attribute))
    }

    /// Pin the current chunk.
    pub fn chunk(&self) -> Result<ChunkHandle> {
        let current = self.current.as_ref().ok_or_else(|| Error::no_current_chunk(self.attribute))?;
        self.table
            .pin_existing(current)?
            .ok_or_else(|| Error::no_current_chunk(self.attribute).with_context("address", current))
    }

    /// Create the chunk at the coordinates, move to it and pin it.
    pub fn new_chunk(&mut self, coords: &[Coordinate]) -> Result<ChunkHandle> {
        let handle = self.table.new_chunk(&Address::new(self.attribute, coords.to_vec()))?;
        self.current = Some(handle.address().clone());
        Ok(handle)
    }

    /// Create the chunk at the coordinates with the compression method, move to it and pin it.
    pub fn new_chunk_with_compression(
        &mut self,
        coords: &[Coordinate],
        compression: CompressionMethod,
    ) -> Result<ChunkHandle> {
        let handle = self
            .table
            .new_chunk_with_compression(&Address::new(self.attribute, coords.to_vec()), compression)?;
        self.current = Some(handle.address().clone());
        Ok(handle)
    }

    /// Delete the chunk of the handle. The iterator stays where it is.
    pub fn delete_chunk(&mut self, handle: ChunkHandle) -> Result<()> {
        self.table.delete_chunk(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chunk_cache_common::{
        error::ErrorKind,
        schema::{ArrayDesc, AttributeDesc, DimensionDesc},
    };
    use chunk_cache_storage::MemStoreRegistry;

    use super::*;
    use crate::cache::SharedMemCache;

    fn table() -> ChunkTable {
        let desc = ArrayDesc::new(
            "iter",
            vec![AttributeDesc::new(0, "v"), AttributeDesc::new(1, "w")],
            vec![DimensionDesc::new("i", 0, 99, 10)],
        );
        let cache = Arc::new(SharedMemCache::new(1 << 20, Arc::new(MemStoreRegistry::default())));
        ChunkTable::new(desc, cache)
    }

    #[test]
    fn test_iterate_in_order() {
        let table = table();
        for i in [50, 10, 30] {
            table.get_or_create(&Address::new(0, vec![i])).unwrap();
        }
        table.get_or_create(&Address::new(1, vec![20])).unwrap();

        let mut iter = table.iterate(0);
        let mut seen = vec![];
        while !iter.end() {
            seen.push(iter.position().unwrap());
            iter.next();
        }
        assert_eq!(seen, vec![vec![10], vec![30], vec![50]]);
        assert_eq!(iter.position().unwrap_err().kind(), ErrorKind::NoCurrentChunk);
        assert_eq!(iter.chunk().unwrap_err().kind(), ErrorKind::NoCurrentChunk);

        iter.reset();
        assert_eq!(iter.position().unwrap(), vec![10]);
    }

    #[test]
    fn test_seek() {
        let table = table();
        table.get_or_create(&Address::new(0, vec![20])).unwrap();

        let mut iter = table.iterate(0);
        assert!(iter.seek(&[27]));
        assert_eq!(iter.position().unwrap(), vec![20]);
        assert!(!iter.seek(&[40]));
        assert!(iter.end());
        assert!(!iter.seek(&[100]));
        assert!(iter.end());
    }

    #[test]
    fn test_new_and_delete_chunk() {
        let table = table();
        let mut iter = table.iterate(0);
        assert!(iter.end());

        let handle = iter.new_chunk(&[45]).unwrap();
        assert_eq!(iter.position().unwrap(), vec![40]);
        handle.set_data(b"forty");
        drop(handle);

        let err = iter.new_chunk(&[41]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChunkAlreadyExists);

        let handle = iter
            .new_chunk_with_compression(&[60], CompressionMethod::Zlib)
            .unwrap();
        assert_eq!(handle.compression(), CompressionMethod::Zlib);
        drop(handle);

        iter.reset();
        let handle = iter.chunk().unwrap();
        assert_eq!(handle.to_vec(), b"forty");
        iter.delete_chunk(handle).unwrap();
        assert_eq!(table.len(), 1);

        // The cursor still points at the deleted address.
        assert_eq!(iter.chunk().unwrap_err().kind(), ErrorKind::NoCurrentChunk);
        iter.next();
        assert_eq!(iter.position().unwrap(), vec![60]);
        assert_eq!(table.cache().resident_bytes(), 0);
    }
}

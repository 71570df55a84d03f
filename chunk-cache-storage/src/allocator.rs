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

use std::collections::{BTreeMap, BTreeSet};

use chunk_cache_common::{bits, strict_assert};

/// Buddy allocator over power-of-two blocks of a growable address space.
///
/// The address space starts as a single block of `min_alloc_size` bytes that is never handed out, then doubles every
/// time a request does not fit into the largest free block. Freed blocks coalesce with their buddy.
#[derive(Debug)]
pub struct BuddyAllocator {
    min_alloc_size: u64,
    /// Total size of the address space, free blocks included.
    allocated_size: u64,
    /// block size -> offsets of free blocks
    freelists: BTreeMap<u64, BTreeSet<u64>>,
}

impl BuddyAllocator {
    /// Create an allocator whose smallest block is `min_alloc_size` (rounded up to a power of two).
    pub fn new(min_alloc_size: usize) -> Self {
        let min_alloc_size = bits::round_up_pow2(min_alloc_size as u64);
        Self {
            min_alloc_size,
            allocated_size: min_alloc_size,
            freelists: BTreeMap::new(),
        }
    }

    /// Smallest block size.
    pub fn min_alloc_size(&self) -> u64 {
        self.min_alloc_size
    }

    /// Total size of the address space, including free blocks and the reserved first block.
    pub fn allocated_size(&self) -> u64 {
        self.allocated_size
    }

    /// Total size of all free blocks.
    pub fn free_bytes(&self) -> u64 {
        self.freelists
            .iter()
            .map(|(size, offsets)| size * offsets.len() as u64)
            .sum()
    }

    /// Size of the largest free block, 0 if there is none.
    pub fn largest_free_block(&self) -> u64 {
        self.freelists.keys().next_back().copied().unwrap_or(0)
    }

    /// Allocate a block of at least `size` bytes. Returns `(offset, block size)`.
    pub fn allocate(&mut self, size: u64) -> (u64, u64) {
        let block = bits::round_up_pow2(size.max(self.min_alloc_size));
        if block > self.largest_free_block() {
            self.grow(block);
        }
        let offset = self.take(block);
        strict_assert!(bits::is_aligned(block, offset));
        (offset, block)
    }

    /// Return a block to the free lists.
    ///
    /// # Panics
    ///
    /// Panics if the block is not a power of two or misaligned.
    pub fn free(&mut self, offset: u64, block: u64) {
        bits::assert_pow2(block);
        assert!(
            bits::is_aligned(block, offset),
            "block at {offset} is not aligned to its size {block}"
        );
        assert!(offset + block <= self.allocated_size, "block at {offset} is out of range");
        self.insert(block, offset);
    }

    fn grow(&mut self, request: u64) {
        while request > self.largest_free_block() {
            // The new upper half is the buddy of everything allocated so far.
            self.freelists
                .entry(self.allocated_size)
                .or_default()
                .insert(self.allocated_size);
            self.allocated_size *= 2;
        }
    }

    fn take(&mut self, block: u64) -> u64 {
        if let Some(offsets) = self.freelists.get_mut(&block) {
            let offset = offsets.pop_first();
            if offsets.is_empty() {
                self.freelists.remove(&block);
            }
            if let Some(offset) = offset {
                return offset;
            }
        }
        // Split a larger block, keep the upper half free.
        let offset = self.take(block * 2);
        self.freelists.entry(block).or_default().insert(offset + block);
        offset
    }

    fn insert(&mut self, block: u64, offset: u64) {
        let buddy = if offset % (block * 2) == 0 {
            offset + block
        } else {
            offset - block
        };
        if let Some(offsets) = self.freelists.get_mut(&block) {
            if offsets.remove(&buddy) {
                if offsets.is_empty() {
                    self.freelists.remove(&block);
                }
                return self.insert(block * 2, offset.min(buddy));
            }
        }
        let inserted = self.freelists.entry(block).or_default().insert(offset);
        assert!(inserted, "double free of block at {offset}");
    }
}

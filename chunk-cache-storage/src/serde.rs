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

use bytes::{Buf, BufMut};

/// Magic of a header in use.
pub const CHUNK_USED_MAGIC: u64 = 0xfeed_face_feed_face;
/// Magic of a header of a freed block.
pub const CHUNK_FREE_MAGIC: u64 = 0xdead_beef_dead_beef;

/// Header that prefixes every chunk written to a data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// [`CHUNK_USED_MAGIC`] or [`CHUNK_FREE_MAGIC`].
    pub magic: u64,
    /// Size of the block the chunk lives in.
    pub allocated: u64,
}

impl ChunkHeader {
    /// Header of a block in use.
    pub fn used(allocated: u64) -> Self {
        Self {
            magic: CHUNK_USED_MAGIC,
            allocated,
        }
    }

    /// Header of a freed block.
    pub fn free(allocated: u64) -> Self {
        Self {
            magic: CHUNK_FREE_MAGIC,
            allocated,
        }
    }

    /// Encoded size.
    pub const fn serialized_len() -> usize {
        8 + 8
    }

    /// Write the header to the buffer.
    pub fn write(&self, mut buf: impl BufMut) {
        buf.put_u64(self.magic);
        buf.put_u64(self.allocated);
    }

    /// Read a header from the buffer. No validation is done here.
    pub fn read(mut buf: impl Buf) -> Self {
        let magic = buf.get_u64();
        let allocated = buf.get_u64();
        tracing::trace!("[chunk header]: read header, magic: {magic:#x}, allocated: {allocated}");
        Self { magic, allocated }
    }

    /// Check if the header belongs to a block in use.
    pub fn is_used(&self) -> bool {
        self.magic == CHUNK_USED_MAGIC
    }

    /// Check if the header belongs to a freed block.
    pub fn is_free(&self) -> bool {
        self.magic == CHUNK_FREE_MAGIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_header() {
        let header = ChunkHeader::used(8192);
        let mut buf = vec![];
        header.write(&mut buf);
        assert_eq!(buf.len(), ChunkHeader::serialized_len());

        let h = ChunkHeader::read(&buf[..]);
        assert_eq!(h, header);
        assert!(h.is_used());
        assert!(!h.is_free());

        let mut buf = vec![];
        ChunkHeader::free(8192).write(&mut buf);
        let h = ChunkHeader::read(&buf[..]);
        assert!(h.is_free());
        assert!(!h.is_used());
        assert_eq!(h.allocated, 8192);

        buf[0] ^= 0xff;
        let h = ChunkHeader::read(&buf[..]);
        assert!(!h.is_used());
        assert!(!h.is_free());
    }
}

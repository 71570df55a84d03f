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

//! chunk-cache keeps the chunks of temporary in-memory arrays under one process-wide memory budget.
//!
//! ```rust
//! use chunk_cache::prelude::*;
//!
//! let cache = ChunkCacheBuilder::new().with_threshold(64 * 1024).build().unwrap();
//! let desc = ArrayDesc::new("a", vec![AttributeDesc::new(0, "v")], vec![DimensionDesc::new("i", 0, 999, 100)]);
//! let table = ChunkTable::new(desc, cache.clone());
//!
//! let handle = table.get_or_create(&Address::new(0, vec![42])).unwrap();
//! handle.set_data(b"hello");
//! handle.release().unwrap();
//!
//! assert_eq!(cache.resident_bytes(), 5);
//! ```

pub use chunk_cache_common as common;
pub use chunk_cache_memory as memory;
pub use chunk_cache_storage as storage;

mod builder;

/// Re-exports of everything needed to use chunk-cache.
pub mod prelude;

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

//! The in-memory part of chunk-cache.
//!
//! Arrays keep their chunks in a [`ChunkTable`]. Every chunk is accounted in one process-wide [`SharedMemCache`],
//! which bounds the bytes of the resident chunks by spilling the least recently unpinned ones to disk.
//!
//! Lock order: table lock, cache lock, chunk lock. Pin counts are only changed under the cache lock.

mod cache;
mod chunk;
mod config;
mod handle;
mod iterator;
mod statistics;
mod table;

mod prelude;
pub use prelude::*;

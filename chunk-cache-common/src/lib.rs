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

//! Shared components for chunk-cache.

/// Allow enable debug assertions in release profile with feature "strict_assertion".
pub mod assert;
/// Power-of-two helpers used by the disk allocators.
pub mod bits;
/// The error type shared by all chunk-cache crates.
pub mod error;
/// Array schema descriptors consumed by the chunk tables.
pub mod schema;
/// Liveness of the query that owns an array.
pub mod session;

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

//! Disk spill targets for chunk-cache.
//!
//! Every array that spills chunks gets its own [`DataStore`], created lazily through a [`StoreRegistry`] on the first
//! eviction of a dirty chunk and removed when the array is torn down.

mod allocator;
mod file;
mod mem;
mod registry;
mod serde;
mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

mod prelude;
pub use prelude::*;

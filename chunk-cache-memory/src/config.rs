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

use std::path::PathBuf;

use chunk_cache_common::error::{Error, ErrorKind, Result};
use chunk_cache_storage::DEFAULT_MIN_ALLOC_SIZE;
use serde::{Deserialize, Serialize};

/// Default resident bytes threshold, 1 GiB.
pub const DEFAULT_MEM_THRESHOLD: usize = 1024 * 1024 * 1024;

/// Startup configuration of the chunk cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Resident bytes above which unpinned chunks are evicted.
    pub threshold: usize,
    /// Base directory of the data stores. Spilled chunks are kept in memory if not set.
    pub dir: Option<PathBuf>,
    /// Smallest allocation of a data store.
    pub min_alloc_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MEM_THRESHOLD,
            dir: None,
            min_alloc_size: DEFAULT_MIN_ALLOC_SIZE,
        }
    }
}

impl CacheConfig {
    /// Verify the config.
    pub fn verify(&self) -> Result<()> {
        if self.min_alloc_size == 0 || !self.min_alloc_size.is_power_of_two() {
            return Err(Error::new(ErrorKind::Config, "min alloc size must be a power of two")
                .with_context("min_alloc_size", self.min_alloc_size));
        }
        if let Some(dir) = self.dir.as_ref() {
            if dir.exists() && !dir.is_dir() {
                return Err(Error::new(ErrorKind::Config, "data store base path is not a directory")
                    .with_context("dir", dir.display()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_verify() {
        CacheConfig::default().verify().unwrap();

        let config = CacheConfig {
            min_alloc_size: 3000,
            ..Default::default()
        };
        assert_eq!(config.verify().unwrap_err().kind(), ErrorKind::Config);

        let file = tempfile::NamedTempFile::new().unwrap();
        let config = CacheConfig {
            dir: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(config.verify().unwrap_err().kind(), ErrorKind::Config);
    }
}

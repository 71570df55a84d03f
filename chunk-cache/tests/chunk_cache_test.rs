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

use chunk_cache::{prelude::*, storage::FsDataStore};

const CHUNK: usize = 1000;

fn desc(name: &str) -> ArrayDesc {
    ArrayDesc::new(
        name,
        vec![AttributeDesc::new(0, "v")],
        vec![DimensionDesc::new("i", 0, 1023, 1)],
    )
}

fn bytes(i: i64) -> Vec<u8> {
    (0..CHUNK).map(|j| (i as usize * 31 + j) as u8).collect()
}

/// Writing every chunk once and scanning them all once spills and loads each chunk exactly once when the threshold
/// holds only a few of them.
#[test_log::test]
fn test_scan_swaps_equal_loads() {
    const N: i64 = 64;

    let dir = tempfile::tempdir().unwrap();
    let cache = ChunkCacheBuilder::new()
        .with_threshold(4 * CHUNK)
        .with_dir(dir.path())
        .with_min_alloc_size(1024)
        .build()
        .unwrap();
    let table = ChunkTable::new(desc("scan"), cache.clone());

    for i in 0..N {
        let handle = table.get_or_create(&Address::new(0, vec![i])).unwrap();
        handle.set_data(&bytes(i));
        handle.release().unwrap();
        assert!(cache.resident_bytes() <= 4 * CHUNK);
    }
    assert_eq!(cache.statistics().swaps(), N as u64 - 4);

    let mut iter = table.iterate(0);
    let mut i = 0;
    while !iter.end() {
        let handle = iter.chunk().unwrap();
        assert_eq!(handle.to_vec(), bytes(i));
        handle.release().unwrap();
        assert!(cache.check_invariant());
        iter.next();
        i += 1;
    }
    assert_eq!(i, N);

    let statistics = cache.statistics();
    assert_eq!(statistics.swaps(), statistics.loads());
    assert_eq!(statistics.loads(), N as u64);
    assert_eq!(statistics.drops(), N as u64 - 4);
}

#[test_log::test]
fn test_array_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ChunkCacheBuilder::new()
        .with_threshold(2 * CHUNK)
        .with_dir(dir.path())
        .with_min_alloc_size(1024)
        .build()
        .unwrap();

    let keep = ChunkTable::new(desc("keep"), cache.clone());
    let temp = ChunkTable::new(desc("temp").with_empty_bitmap(), cache.clone());

    for i in 0..8 {
        let handle = temp.get_or_create(&Address::new(0, vec![i])).unwrap();
        handle.set_data(&bytes(i));
        let bitmap = handle.pin_bitmap().unwrap().unwrap();
        bitmap.set_data(&[0xff]);
    }
    // Value and bitmap chunks.
    assert_eq!(temp.len(), 16);
    let guid = temp.store_guid().unwrap();
    let path = FsDataStore::path_for(dir.path(), guid);
    assert!(path.exists());

    let handle = keep.get_or_create(&Address::new(0, vec![0])).unwrap();
    handle.set_data(&bytes(100));
    drop(handle);

    // The newest chunk survives the eviction it triggered.
    assert!(keep.peek(&Address::new(0, vec![0])).unwrap().is_resident());
    drop(temp);
    assert!(!path.exists());
    assert_eq!(cache.resident_bytes(), CHUNK);
    assert!(cache.check_invariant());

    let handle = keep.get_or_create(&Address::new(0, vec![0])).unwrap();
    assert_eq!(handle.to_vec(), bytes(100));
}

#[test_log::test]
fn test_tables_share_budget_across_threads() {
    let cache = ChunkCacheBuilder::new().with_threshold(8 * CHUNK).build().unwrap();

    let handles = (0..4)
        .map(|t| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                let table = ChunkTable::new(desc(&format!("t{t}")), cache);
                for i in 0..32 {
                    let handle = table.get_or_create(&Address::new(0, vec![i])).unwrap();
                    handle.set_data(&bytes(i + t));
                }
                for i in 0..32 {
                    let handle = table.get_or_create(&Address::new(0, vec![i])).unwrap();
                    assert_eq!(handle.to_vec(), bytes(i + t));
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.resident_bytes(), 0);
    assert!(cache.statistics().swaps() > 0);
}

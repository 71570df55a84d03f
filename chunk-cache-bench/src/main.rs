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

//! Drive the chunk cache from many threads, each owning one array.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use bytesize::ByteSize;
use chunk_cache::prelude::*;
use clap::Parser;
use hdrhistogram::Histogram;
use itertools::Itertools;
use rand::{rngs::SmallRng, Rng, SeedableRng};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Directory of the data stores. Spilled chunks are kept in memory if not set.
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Resident bytes threshold.
    #[arg(long, default_value = "64MiB")]
    threshold: ByteSize,

    /// Smallest data store allocation.
    #[arg(long, default_value = "4KiB")]
    min_alloc_size: ByteSize,

    /// Size of every chunk.
    #[arg(long, default_value = "64KiB")]
    chunk_size: ByteSize,

    /// Chunks written by every thread.
    #[arg(long, default_value_t = 1024)]
    chunks: usize,

    /// Thread count, one array per thread.
    #[arg(short, long, default_value_t = 8)]
    threads: usize,

    /// Full verification scans after the writes.
    #[arg(long, default_value_t = 2)]
    scans: usize,
}

struct Report {
    lats: Histogram<u64>,
    bytes: u64,
}

fn init_logger() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_line_number(true))
        .with(EnvFilter::from_default_env())
        .init();
}

fn payload(thread: usize, index: usize, len: usize) -> Vec<u8> {
    let mut rng = SmallRng::seed_from_u64(((thread as u64) << 32) | index as u64);
    let mut buf = vec![0; len];
    rng.fill(&mut buf[..]);
    buf
}

fn pin(table: &ChunkTable, index: usize, lats: &mut Histogram<u64>) -> Result<ChunkHandle> {
    let now = Instant::now();
    let handle = table.get_or_create(&Address::new(0, vec![index as Coordinate]))?;
    lats.record(now.elapsed().as_micros() as u64)?;
    Ok(handle)
}

fn run(thread: usize, cache: Arc<SharedMemCache>, args: &Args) -> Result<Report> {
    let desc = ArrayDesc::new(
        format!("bench-{thread}"),
        vec![AttributeDesc::new(0, "payload")],
        vec![DimensionDesc::new("i", 0, args.chunks as Coordinate - 1, 1)],
    );
    let table = ChunkTable::new(desc, cache);
    let len = args.chunk_size.as_u64() as usize;

    let mut lats = Histogram::new_with_bounds(1, Duration::from_secs(60).as_micros() as u64, 3)?;
    let mut bytes = 0;

    for index in 0..args.chunks {
        let handle = pin(&table, index, &mut lats)?;
        handle.set_data(&payload(thread, index, len));
        handle.release()?;
        bytes += len as u64;
    }

    for _ in 0..args.scans {
        for index in 0..args.chunks {
            let handle = pin(&table, index, &mut lats)?;
            let expected = payload(thread, index, len);
            if !handle.read(|buf| buf == expected.as_slice()) {
                return Err(anyhow!("thread {thread} read corrupted chunk {index}"));
            }
            handle.release()?;
            bytes += len as u64;
        }
    }

    tracing::debug!("[bench]: thread {thread} done, store: {:?}", table.store_guid());
    Ok(Report { lats, bytes })
}

fn main() -> Result<()> {
    init_logger();

    #[cfg(feature = "deadlock")]
    {
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(1));
            let deadlocks = parking_lot::deadlock::check_deadlock();
            if deadlocks.is_empty() {
                continue;
            }

            println!("{} deadlocks detected", deadlocks.len());
            for (i, threads) in deadlocks.iter().enumerate() {
                println!("Deadlock #{}", i);
                for t in threads {
                    println!("Thread Id {:#?}", t.thread_id());
                    println!("{:#?}", t.backtrace());
                }
            }
            panic!()
        });
    }

    let args = Args::parse();
    println!("{:#?}", args);
    assert!(args.chunks > 0, "\"--chunks\" value must be greater than 0");

    let mut builder = ChunkCacheBuilder::new()
        .with_threshold(args.threshold.as_u64() as usize)
        .with_min_alloc_size(args.min_alloc_size.as_u64() as usize);
    if let Some(dir) = args.dir.as_ref() {
        builder = builder.with_dir(dir);
    }
    let cache = builder.build()?;

    let start = Instant::now();
    let handles = (0..args.threads)
        .map(|thread| {
            let cache = cache.clone();
            let args = args.clone();
            std::thread::spawn(move || run(thread, cache, &args))
        })
        .collect_vec();

    let mut lats = Histogram::<u64>::new_with_bounds(1, Duration::from_secs(60).as_micros() as u64, 3)?;
    let mut bytes = 0;
    for handle in handles {
        let report = handle.join().map_err(|_| anyhow!("bench thread panicked"))??;
        lats.add(&report.lats)?;
        bytes += report.bytes;
    }
    let elapsed = start.elapsed();

    let quantiles = [("p50", 0.5), ("p90", 0.9), ("p99", 0.99), ("p999", 0.999)]
        .iter()
        .map(|(name, q)| format!("{name}: {}us", lats.value_at_quantile(*q)))
        .join(", ");
    let statistics = cache.statistics();

    println!();
    println!("elapsed: {elapsed:.3?}");
    println!(
        "throughput: {}/s",
        ByteSize::b((bytes as f64 / elapsed.as_secs_f64()) as u64)
    );
    println!("pins: {}, {quantiles}, max: {}us", lats.len(), lats.max());
    println!(
        "swaps: {}, loads: {}, drops: {}, resident: {}",
        statistics.swaps(),
        statistics.loads(),
        statistics.drops(),
        ByteSize::b(cache.resident_bytes() as u64)
    );

    Ok(())
}

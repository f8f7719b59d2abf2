// capacity.rs - Benchmark linear-scan addressing cost against log capacity
use aesd_buffer::SharedStore;
use aesd_core::{Record, SeekTo};
use std::time::{Duration, Instant};

pub struct CapacityResult {
    pub capacity: usize,
    pub total_bytes: u64,
    pub seek_avg: Duration,
    pub read_avg: Duration,
}

fn filled_store(capacity: usize) -> SharedStore {
    let store = SharedStore::with_capacity(capacity);
    // twice the capacity so the ring has wrapped
    for i in 0..capacity * 2 {
        let _ = store.commit(Record::new(format!("capacity bench line {:08}\n", i).into_bytes()));
    }
    store
}

/// Seek to the middle record and read the tail, for each capacity
pub fn bench_capacities(iterations: u32) -> Vec<CapacityResult> {
    println!("\n=== Benchmarking Addressing Cost vs Capacity ===");
    let mut results = vec![];

    for &capacity in &[10usize, 100, 1000, 10000] {
        let store = filled_store(capacity);
        let middle = SeekTo::new((capacity / 2) as u32, 3);

        let start = Instant::now();
        let mut position = 0;
        for _ in 0..iterations {
            position = store.seek(middle).unwrap_or(0);
        }
        let seek_avg = start.elapsed() / iterations;

        let start = Instant::now();
        let mut copied = 0;
        for _ in 0..iterations {
            copied += store.snapshot(position).len();
        }
        let read_avg = start.elapsed() / iterations;

        println!("  capacity {:>6}: copied {} bytes", capacity, copied);
        results.push(CapacityResult {
            capacity,
            total_bytes: store.total_bytes(),
            seek_avg,
            read_avg,
        });
    }

    results
}

pub fn print_capacity_results(results: &[CapacityResult]) {
    println!("\n{:<10} {:>12} {:>14} {:>14}", "Capacity", "Bytes", "Seek avg", "Tail read avg");
    println!("{}", "-".repeat(54));
    for r in results {
        println!("{:<10} {:>12} {:>14.2?} {:>14.2?}", r.capacity, r.total_bytes, r.seek_avg, r.read_avg);
    }
}

// concurrency.rs - Benchmark writers contending on the shared store lock
use aesd_buffer::SharedStore;
use aesd_core::Record;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct ConcurrencyResult {
    pub test_name: String,
    pub num_threads: usize,
    pub duration: Duration,
    pub total_records: u64,
    pub throughput: f64,
    pub evicted: u64,
    pub torn: usize,
}

fn run_writers(test_name: String, capacity: usize, num_threads: usize, records_per_thread: usize) -> ConcurrencyResult {
    let store = Arc::new(SharedStore::with_capacity(capacity));
    let start = Instant::now();

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut evicted = 0u64;
                for i in 0..records_per_thread {
                    let line = format!("T{:02} record {:08}\n", thread_id, i);
                    if let Ok(Some(_)) = store.commit(Record::new(line.into_bytes())) {
                        evicted += 1;
                    }
                }
                evicted
            })
        })
        .collect();

    let evicted: u64 = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
    let duration = start.elapsed();
    let total = (num_threads * records_per_thread) as u64;

    // every retained record must be exactly one writer's line
    let torn = store
        .records()
        .iter()
        .filter(|r| r.len() != 20 || !r.as_bytes().starts_with(b"T"))
        .count();

    ConcurrencyResult {
        test_name,
        num_threads,
        duration,
        total_records: total,
        throughput: total as f64 / duration.as_secs_f64(),
        evicted,
        torn,
    }
}

/// Benchmark a single writer (no contention baseline)
pub fn bench_single_writer(num_records: usize) -> ConcurrencyResult {
    println!("\n=== Benchmarking Single Writer ===");
    run_writers("Single Writer".to_string(), 10, 1, num_records)
}

/// Benchmark several writers sharing one store
pub fn bench_multi_writer(num_threads: usize, records_per_thread: usize) -> ConcurrencyResult {
    println!("\n=== Benchmarking {} Writers (shared lock) ===", num_threads);
    run_writers(format!("{} Writers", num_threads), 10, num_threads, records_per_thread)
}

/// Thread scalability: 1, 2, 4, 8, 16 writers
pub fn bench_thread_scalability(records_per_thread: usize) -> Vec<ConcurrencyResult> {
    println!("\n=== Benchmarking Writer Scalability ===");
    [1, 2, 4, 8, 16]
        .iter()
        .map(|&n| run_writers(format!("{} Writers", n), 10, n, records_per_thread))
        .collect()
}

pub fn print_concurrency_results(results: &[ConcurrencyResult]) {
    println!("\n{:<20} {:>8} {:>12} {:>14} {:>10} {:>6}", "Test", "Threads", "Duration", "Records/s", "Evicted", "Torn");
    println!("{}", "-".repeat(75));
    for r in results {
        println!(
            "{:<20} {:>8} {:>10.2?} {:>14.0} {:>10} {:>6}",
            r.test_name, r.num_threads, r.duration, r.throughput, r.evicted, r.torn
        );
        if r.torn > 0 {
            eprintln!("WARNING: {} torn records in '{}' ({} written)", r.torn, r.test_name, r.total_records);
        }
    }
}

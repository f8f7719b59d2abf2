// cpu_monitor.rs - CPU usage of this process while a benchmark runs
use sysinfo::{CpuRefreshKind, ProcessRefreshKind, RefreshKind, System};
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::thread;
use std::time::Duration;

pub struct CpuStats {
    pub avg_cpu_percent: f32,
    pub peak_cpu_percent: f32,
    pub samples: usize,
}

fn sample_until(stop: Arc<AtomicBool>) -> CpuStats {
    let mut sys = System::new_with_specifics(
        RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_processes(ProcessRefreshKind::everything())
    );
    let pid = sysinfo::get_current_pid().ok();

    let mut samples = vec![];
    sys.refresh_cpu();
    thread::sleep(Duration::from_millis(100));

    while !stop.load(Ordering::Relaxed) {
        sys.refresh_cpu();
        if let Some(pid) = pid {
            sys.refresh_process(pid);
            if let Some(process) = sys.process(pid) {
                samples.push(process.cpu_usage());
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    let avg = if !samples.is_empty() {
        samples.iter().sum::<f32>() / samples.len() as f32
    } else {
        0.0
    };
    let peak = samples.iter().copied().fold(0.0f32, f32::max);

    CpuStats {
        avg_cpu_percent: avg,
        peak_cpu_percent: peak,
        samples: samples.len(),
    }
}

/// Run a benchmark with CPU monitoring
pub fn run_with_cpu_monitor<F, R>(name: &str, benchmark_fn: F) -> (R, CpuStats)
where
    F: FnOnce() -> R,
{
    println!("\n=== Running {} with CPU monitoring ===", name);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);
    let monitor_handle = thread::spawn(move || sample_until(stop_clone));

    let result = benchmark_fn();

    stop.store(true, Ordering::Relaxed);
    let cpu_stats = monitor_handle.join().unwrap_or(CpuStats {
        avg_cpu_percent: 0.0,
        peak_cpu_percent: 0.0,
        samples: 0,
    });

    println!("CPU Stats: avg={:.1}%, peak={:.1}%, samples={}",
        cpu_stats.avg_cpu_percent,
        cpu_stats.peak_cpu_percent,
        cpu_stats.samples
    );

    (result, cpu_stats)
}

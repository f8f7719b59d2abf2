// aesd-bench: shared store benchmark suite
// Measures lock contention between writers and linear-scan addressing cost
mod capacity;
mod concurrency;
mod cpu_monitor;

use clap::{Parser, Subcommand};
use std::process;

#[derive(Parser)]
#[command(name = "aesd-bench")]
#[command(about = "Shared store benchmark suite", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run all benchmark cases
    #[arg(short, long)]
    all: bool,

    /// Run specific case (shorthand for 'case' subcommand)
    #[arg(short = 'c', long = "case", value_name = "NAME")]
    case: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run specific benchmark case
    Case {
        /// Case name to run
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// List all available benchmark cases
    List,
}

fn list_cases() {
    println!("\n=== Available Benchmark Cases ===\n");

    println!("CONCURRENCY:");
    println!("  concurrency-single  - Single writer baseline");
    println!("  concurrency-multi   - 4 writers on one store");
    println!("  concurrency-scale   - Writer scalability (1,2,4,8,16 threads)");
    println!("  concurrency-cpu     - 8 writers with CPU monitoring");
    println!();

    println!("ADDRESSING:");
    println!("  capacity            - Seek and tail read cost vs capacity");
    println!();

    println!("Usage:");
    println!("  aesd-bench -a                        # Run all benchmarks");
    println!("  aesd-bench -c concurrency-scale      # Run scalability test");
    println!("  aesd-bench list                      # Show this list");
}

fn run_concurrency_single() {
    let result = concurrency::bench_single_writer(200_000);
    concurrency::print_concurrency_results(&[result]);
}

fn run_concurrency_multi() {
    let result = concurrency::bench_multi_writer(4, 50_000);
    concurrency::print_concurrency_results(&[result]);
}

fn run_concurrency_scale() {
    let results = concurrency::bench_thread_scalability(20_000);
    concurrency::print_concurrency_results(&results);
}

fn run_concurrency_cpu() {
    let (result, _) = cpu_monitor::run_with_cpu_monitor("8 writers", || {
        concurrency::bench_multi_writer(8, 50_000)
    });
    concurrency::print_concurrency_results(&[result]);
}

fn run_capacity() {
    let results = capacity::bench_capacities(1_000);
    capacity::print_capacity_results(&results);
}

fn run_all() {
    run_concurrency_single();
    run_concurrency_multi();
    run_concurrency_scale();
    run_concurrency_cpu();
    run_capacity();
    println!("\nAll benchmarks completed");
}

fn run_case(name: &str) {
    match name {
        "concurrency-single" => run_concurrency_single(),
        "concurrency-multi" => run_concurrency_multi(),
        "concurrency-scale" => run_concurrency_scale(),
        "concurrency-cpu" => run_concurrency_cpu(),
        "capacity" => run_capacity(),
        _ => {
            eprintln!("Error: Unknown benchmark case '{}'", name);
            eprintln!("Run 'aesd-bench list' to see available cases");
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.all {
        run_all();
    } else if let Some(case_name) = cli.case {
        run_case(&case_name);
    } else {
        match cli.command {
            Some(Commands::Case { name }) => run_case(&name),
            Some(Commands::List) => list_cases(),
            None => {
                println!("\nNo benchmark specified. Use one of:");
                println!("  aesd-bench -a              # Run all benchmarks");
                println!("  aesd-bench -c <case>       # Run specific case");
                println!("  aesd-bench list            # List available cases");
            }
        }
    }
}

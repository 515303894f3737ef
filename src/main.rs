//! Unique IPv4 Counter CLI
//!
//! Counts the distinct IPv4 addresses in a one-address-per-line text
//! file using a fixed pool of workers over line-aligned chunks and a
//! shared 512 MiB presence bitmap.
//!
//! # Output Format
//!
//! The count is written to stdout as a single integer. Statistics are
//! written to stderr upon completion:
//! `chunks=N bytes=N lines=N parse_errors=N failed_chunks=N unique=N elapsed_ms=N throughput_mib_s=N workers=N mode=M`
//!
//! # Exit Codes
//!
//! - `0`: Success (the count was printed)
//! - `1`: Runtime error (open/plan/scan failure)
//! - `2`: Invalid arguments

use std::env;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use ipcount_rs::{
    count_unique, count_unique_serial, count_unique_with_sink, CountConfig, FailurePolicy,
    ScanReport, StderrSink,
};

/// Mirrors the planner's cap, in the unit the flag is expressed in.
const MAX_CHUNK_MB: u64 = 200;
const DEFAULT_CHUNK_MB: u64 = 20;

fn print_usage(exe: &std::ffi::OsStr) {
    eprintln!(
        "usage: {} [OPTIONS] <file>

OPTIONS:
    --chunk-size-mb=<N>     Chunk size in MiB (default: {DEFAULT_CHUNK_MB}, max: {MAX_CHUNK_MB})
    --workers=<N>           Number of worker threads (0 or unset: auto-detect CPU count)
    --serial                Single-threaded streaming scan (no chunking)
    --best-effort           Keep scanning past chunk I/O errors; report the partial count
    --progress              Print per-chunk timing to stderr
    --help, -h              Show this help message",
        exe.to_string_lossy()
    );
}

fn main() {
    let mut args = env::args_os();
    let exe = args.next().unwrap_or_else(|| "ipcount".into());

    let mut path: Option<PathBuf> = None;
    let mut chunk_mb = DEFAULT_CHUNK_MB;
    let mut workers = 0usize;
    let mut serial = false;
    let mut best_effort = false;
    let mut progress = false;

    for arg in args {
        if let Some(flag) = arg.to_str() {
            if let Some(value) = flag.strip_prefix("--chunk-size-mb=") {
                chunk_mb = value.parse().unwrap_or_else(|_| {
                    eprintln!("invalid --chunk-size-mb value: {}", value);
                    process::exit(2);
                });
                if chunk_mb == 0 {
                    eprintln!("--chunk-size-mb must be >= 1");
                    process::exit(2);
                }
                continue;
            }
            if let Some(value) = flag.strip_prefix("--workers=") {
                workers = value.parse().unwrap_or_else(|_| {
                    eprintln!("invalid --workers value: {}", value);
                    process::exit(2);
                });
                continue;
            }
            match flag {
                "--serial" => {
                    serial = true;
                    continue;
                }
                "--best-effort" => {
                    best_effort = true;
                    continue;
                }
                "--progress" => {
                    progress = true;
                    continue;
                }
                "--help" | "-h" => {
                    print_usage(&exe);
                    process::exit(0);
                }
                _ if flag.starts_with("--") => {
                    eprintln!("unknown flag: {}", flag);
                    print_usage(&exe);
                    process::exit(2);
                }
                _ => {}
            }
        }

        if path.is_some() {
            print_usage(&exe);
            process::exit(2);
        }
        path = Some(PathBuf::from(arg));
    }

    let Some(path) = path else {
        print_usage(&exe);
        process::exit(2);
    };

    if chunk_mb > MAX_CHUNK_MB {
        eprintln!("chunk size capped at {MAX_CHUNK_MB} MiB");
        chunk_mb = MAX_CHUNK_MB;
    }

    let resolved_workers = if serial {
        1
    } else if workers > 0 {
        workers
    } else {
        num_cpus::get().max(1)
    };

    let start = Instant::now();
    let result = if serial {
        count_unique_serial(&path)
    } else {
        let config = CountConfig {
            path,
            chunk_size: chunk_mb * 1024 * 1024,
            workers,
            policy: if best_effort {
                FailurePolicy::BestEffort
            } else {
                FailurePolicy::FailFast
            },
        };
        if progress {
            count_unique_with_sink(&config, &StderrSink)
        } else {
            count_unique(&config)
        }
    };

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    };

    for failure in &report.failures {
        eprintln!("warning: skipped {failure}");
    }

    println!("{}", report.unique);
    print_stats(&report, start, resolved_workers, serial);
}

fn print_stats(report: &ScanReport, start: Instant, workers: usize, serial: bool) {
    let elapsed = start.elapsed();
    let elapsed_secs = elapsed.as_secs_f64();
    let throughput_mib = if elapsed_secs > 0.0 {
        (report.stats.bytes_scanned as f64 / (1024.0 * 1024.0)) / elapsed_secs
    } else {
        0.0
    };

    eprintln!(
        "chunks={} bytes={} lines={} parse_errors={} failed_chunks={} unique={} \
         elapsed_ms={} throughput_mib_s={:.2} workers={} mode={}",
        report.stats.chunks_scanned,
        report.stats.bytes_scanned,
        report.stats.lines,
        report.stats.parse_errors,
        report.failures.len(),
        report.unique,
        elapsed.as_millis(),
        throughput_mib,
        workers,
        if serial { "serial" } else { "multi" }
    );
}

//! Parallel unique-address counting.
//!
//! This module is the run orchestrator: it plans line-aligned jobs,
//! allocates the shared presence bitmap, drives a fixed pool of worker
//! threads over a pre-filled job queue, and merges per-worker stats
//! after the join barrier.
//!
//! # Architecture
//!
//! ```text
//!   path ──► compute_offsets() ──► jobs_from_offsets() ──► ArrayQueue
//!                                                              │
//!                      ┌───────────────┬───────────────────────┤
//!                      ▼               ▼                       ▼
//!                  worker 0        worker 1      ...       worker N-1
//!                      │  line ─► ipv4::parse ─► PresenceBitmap.insert
//!                      │                              │ (newly set)
//!                      └───────── join ◄──────────────┴─► unique += 1
//!                                   │
//!                                   ▼
//!                              ScanReport
//! ```
//!
//! # Correctness invariants
//!
//! - **Exactly-once coverage**: jobs tile `[0, file_size)`; each job is
//!   popped by exactly one worker.
//! - **Exact dedup**: the bitmap's atomic insert admits exactly one
//!   winner per address; the unique counter is incremented only on a win.
//! - **Join before read**: the counter and merged stats are read only
//!   after every worker has been joined, so `Relaxed` counter updates
//!   are already ordered by the join's happens-before edge.
//! - **No shared read state**: each worker owns its file handle and read
//!   buffer; the queue, bitmap, counter and stop flag are the only
//!   shared structures, all accessed through atomics (the queue is
//!   lock-free).
//!
//! # Memory
//!
//! Peak = 512 MiB bitmap + per-worker read buffers. A job never exceeds
//! twice the chunk size (enforced at planning), so buffers are bounded
//! by `workers * 2 * chunk_size`.

use std::fmt;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_queue::ArrayQueue;
use memchr::memchr_iter;

use crate::ipv4;
use crate::presence::PresenceBitmap;
use crate::scheduler::chunking::{self, Job, PlanError, MAX_CHUNK_SIZE};
use crate::scheduler::events::{NullSink, ScanEventSink};
use crate::scheduler::trim_line_terminator;

/// Default chunk size (20 MiB), the original tool's default granularity.
pub const DEFAULT_CHUNK_SIZE: u64 = 20 * 1024 * 1024;

// ============================================================================
// Configuration
// ============================================================================

/// What to do when scanning one chunk hits an I/O error.
///
/// Planning errors are always fatal; this policy only governs errors
/// that happen after workers have started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// First chunk error stops the run; no partial count is surfaced.
    #[default]
    FailFast,
    /// Failed chunks are recorded and the run returns the partial count
    /// together with the failure list.
    BestEffort,
}

/// Configuration for a counting run.
#[derive(Clone, Debug)]
pub struct CountConfig {
    /// Input file of one dotted-quad address per line.
    pub path: PathBuf,

    /// Target chunk size in bytes; clamped to
    /// [`MAX_CHUNK_SIZE`](crate::scheduler::chunking::MAX_CHUNK_SIZE)
    /// to bound single-job memory. Must be > 0.
    pub chunk_size: u64,

    /// Worker thread count; 0 selects the available hardware
    /// parallelism.
    pub workers: usize,

    /// Chunk I/O failure policy.
    pub policy: FailurePolicy,
}

impl CountConfig {
    /// Config with the default chunk size, auto worker count, and
    /// fail-fast policy.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
            policy: FailurePolicy::FailFast,
        }
    }

    fn effective_chunk_size(&self) -> u64 {
        self.chunk_size.min(MAX_CHUNK_SIZE)
    }

    fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            num_cpus::get().max(1)
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Counters accumulated per worker and merged after the join.
///
/// Plain integers on purpose: each worker owns its copy, so hot-path
/// updates cost nothing and merging happens once, post-join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Chunks fully scanned.
    pub chunks_scanned: u64,
    /// Bytes read and scanned.
    pub bytes_scanned: u64,
    /// Non-empty lines seen (valid or not).
    pub lines: u64,
    /// Lines that failed address parsing and were skipped.
    pub parse_errors: u64,
}

impl ScanStats {
    fn merge(&mut self, other: &ScanStats) {
        self.chunks_scanned += other.chunks_scanned;
        self.bytes_scanned += other.bytes_scanned;
        self.lines += other.lines;
        self.parse_errors += other.parse_errors;
    }
}

/// One chunk that could not be scanned.
#[derive(Debug)]
pub struct ChunkFailure {
    /// Sequence index of the failed job.
    pub index: usize,
    /// Job range start.
    pub start: u64,
    /// Job range end (exclusive).
    pub end: u64,
    /// The underlying I/O error.
    pub error: io::Error,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} (bytes {}..{}): {}",
            self.index, self.start, self.end, self.error
        )
    }
}

/// Result of a counting run.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Count of distinct valid addresses — the answer.
    pub unique: u64,
    /// Merged per-worker counters.
    pub stats: ScanStats,
    /// Chunks skipped under [`FailurePolicy::BestEffort`], ordered by
    /// index. Empty on a fully successful run.
    pub failures: Vec<ChunkFailure>,
}

// ============================================================================
// Errors
// ============================================================================

/// Fatal errors from a counting run.
#[derive(Debug)]
#[non_exhaustive]
pub enum CountError {
    /// Offset planning failed (stat/open/probe error or over-long line).
    Plan(PlanError),
    /// A chunk scan failed under [`FailurePolicy::FailFast`].
    Chunk(ChunkFailure),
    /// Stream I/O error in the serial scanner.
    Io(io::Error),
}

impl fmt::Display for CountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan(err) => write!(f, "chunk planning failed: {err}"),
            Self::Chunk(failure) => write!(f, "chunk scan failed: {failure}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for CountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Plan(err) => Some(err),
            Self::Chunk(failure) => Some(&failure.error),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<PlanError> for CountError {
    fn from(err: PlanError) -> Self {
        Self::Plan(err)
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Counts distinct valid IPv4 addresses in `config.path`.
///
/// Equivalent to [`count_unique_with_sink`] with a [`NullSink`].
pub fn count_unique(config: &CountConfig) -> Result<ScanReport, CountError> {
    count_unique_with_sink(config, &NullSink)
}

/// Counts distinct valid IPv4 addresses, reporting chunk progress to
/// `sink`.
///
/// Plans line-aligned jobs, fills the queue once, runs the fixed worker
/// pool to exhaustion, joins every worker, then reads the counter. The
/// result is invariant under chunk size and worker count.
///
/// # Errors
///
/// - [`CountError::Plan`] before any worker starts.
/// - [`CountError::Chunk`] under [`FailurePolicy::FailFast`] when a
///   chunk scan fails; the remaining jobs are abandoned.
pub fn count_unique_with_sink(
    config: &CountConfig,
    sink: &dyn ScanEventSink,
) -> Result<ScanReport, CountError> {
    let offsets = chunking::compute_offsets(&config.path, config.effective_chunk_size())?;
    let jobs = chunking::jobs_from_offsets(&offsets);
    if jobs.is_empty() {
        return Ok(ScanReport::default());
    }
    run_jobs(config, sink, &jobs)
}

/// Runs the worker pool over a precomputed job list.
///
/// Split out from [`count_unique_with_sink`] so failure handling can be
/// exercised with fabricated jobs in tests.
fn run_jobs(
    config: &CountConfig,
    sink: &dyn ScanEventSink,
    jobs: &[Job],
) -> Result<ScanReport, CountError> {
    debug_assert!(!jobs.is_empty(), "run_jobs requires at least one job");

    let bitmap = PresenceBitmap::new();
    let unique = AtomicU64::new(0);
    let stop = AtomicBool::new(false);

    let queue = ArrayQueue::new(jobs.len());
    for job in jobs {
        // One-shot fill of a queue sized to the job count.
        queue.push(*job).expect("job queue sized to job count");
    }

    let workers = config.effective_workers();
    let outcomes = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let handle = thread::Builder::new()
                .name(format!("ipcount-worker-{worker_id}"))
                .spawn_scoped(scope, || {
                    worker_loop(
                        &config.path,
                        &queue,
                        &bitmap,
                        &unique,
                        &stop,
                        config.policy,
                        sink,
                    )
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        // Join barrier: no shared state is read until every worker is done.
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect::<Vec<_>>()
    });

    let mut stats = ScanStats::default();
    let mut failures = Vec::new();
    for outcome in outcomes {
        stats.merge(&outcome.stats);
        failures.extend(outcome.failures);
    }
    failures.sort_by_key(|f| f.index);

    if config.policy == FailurePolicy::FailFast && !failures.is_empty() {
        return Err(CountError::Chunk(failures.remove(0)));
    }

    Ok(ScanReport {
        unique: unique.load(Ordering::Relaxed),
        stats,
        failures,
    })
}

// ============================================================================
// Workers
// ============================================================================

/// Everything a worker hands back at the join barrier.
#[derive(Debug, Default)]
struct WorkerOutcome {
    stats: ScanStats,
    failures: Vec<ChunkFailure>,
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    path: &Path,
    queue: &ArrayQueue<Job>,
    bitmap: &PresenceBitmap,
    unique: &AtomicU64,
    stop: &AtomicBool,
    policy: FailurePolicy,
    sink: &dyn ScanEventSink,
) -> WorkerOutcome {
    let mut outcome = WorkerOutcome::default();
    // Reused across jobs; grows to the largest job this worker sees.
    let mut buf: Vec<u8> = Vec::new();

    while !stop.load(Ordering::Relaxed) {
        let Some(job) = queue.pop() else { break };

        sink.chunk_started(&job);
        let started = Instant::now();
        match scan_chunk(path, job, &mut buf, bitmap, unique, &mut outcome.stats) {
            Ok(()) => sink.chunk_finished(&job, started.elapsed()),
            Err(error) => {
                sink.chunk_failed(&job, &error);
                outcome.failures.push(ChunkFailure {
                    index: job.index,
                    start: job.start,
                    end: job.end,
                    error,
                });
                if policy == FailurePolicy::FailFast {
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }
    }

    outcome
}

/// Scans one job: reads the exact byte range through an independent file
/// handle, then feeds every line through the codec into the bitmap.
fn scan_chunk(
    path: &Path,
    job: Job,
    buf: &mut Vec<u8>,
    bitmap: &PresenceBitmap,
    unique: &AtomicU64,
    stats: &mut ScanStats,
) -> io::Result<()> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(job.start))?;

    buf.clear();
    buf.reserve(job.len() as usize);
    let read = file.take(job.len()).read_to_end(buf)?;
    if (read as u64) < job.len() {
        // File shrank between planning and scanning.
        return Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("chunk truncated: read {read} of {} bytes", job.len()),
        ));
    }

    stats.bytes_scanned += read as u64;
    stats.chunks_scanned += 1;

    let mut pos = 0usize;
    for nl in memchr_iter(b'\n', buf) {
        note_line(&buf[pos..nl], bitmap, unique, stats);
        pos = nl + 1;
    }
    // Final fragment without a terminator (last chunk of a file that
    // does not end in '\n').
    note_line(&buf[pos..], bitmap, unique, stats);

    Ok(())
}

#[inline]
fn note_line(raw: &[u8], bitmap: &PresenceBitmap, unique: &AtomicU64, stats: &mut ScanStats) {
    let line = trim_line_terminator(raw);
    if line.is_empty() {
        return;
    }
    stats.lines += 1;
    match ipv4::parse(line) {
        Ok(addr) => {
            if bitmap.insert_if_absent(addr) {
                unique.fetch_add(1, Ordering::Relaxed);
            }
        }
        Err(_) => stats.parse_errors += 1,
    }
}

// ============================================================================
// Tests
// ============================================================================

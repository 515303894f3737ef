//! Exact unique-IPv4 counting over line-oriented text files.
//!
//! ## Scope
//! This crate counts the distinct IPv4 addresses in a file of one
//! dotted-quad address per line, without loading the file into memory
//! and without a hash set: presence is tracked in a dense 2^32-bit
//! atomic bitmap (512 MiB) covering the entire address space.
//!
//! ## Key invariants
//! - Chunk boundaries never split a line: every planned offset is 0,
//!   the file size, or immediately follows a `\n`.
//! - Jobs tile `[0, file_size)` exactly once; each job is consumed by
//!   exactly one worker.
//! - A bitmap bit transitions 0→1 at most once per run, and exactly one
//!   concurrent inserter observes the transition; the unique counter is
//!   incremented exactly then.
//! - Workers are joined before any shared state is read.
//!
//! ## Run flow (parallel)
//! 1) Plan line-aligned offsets (single forward pass, `memchr` probes).
//! 2) Fill a fixed-capacity job queue once.
//! 3) N workers drain the queue; each reads its byte range through its
//!    own file handle, splits lines, decodes, inserts.
//! 4) Join, merge per-worker stats, read the counter.
//!
//! ## Notable entry points
//! - [`count_unique`] / [`count_unique_with_sink`]: parallel counting.
//! - [`count_unique_serial`]: streaming single-threaded counting.
//! - [`CountConfig`], [`FailurePolicy`]: run configuration.
//! - [`ipv4::parse`] / [`ipv4::format`]: the address codec.
//! - [`PresenceBitmap`]: the shared insert-if-absent structure.
//!
//! ## Design trade-offs
//! The dense bitmap buys exact counting and lock-free inserts at a flat
//! 512 MiB cost, which is far below what a hash set would need near the
//! address space's cardinality. Malformed lines are skipped and counted
//! as parse errors rather than failing the run; chunk-level I/O failures
//! are governed by an explicit [`FailurePolicy`].

pub mod ipv4;
pub mod presence;
pub mod scheduler;
pub mod stdx;

pub use presence::{PresenceBitmap, ADDRESS_SPACE_BITS};
pub use scheduler::{
    count_unique, count_unique_serial, count_unique_with_sink, ChunkFailure, CountConfig,
    CountError, FailurePolicy, Job, NullSink, PlanError, ScanEventSink, ScanReport, ScanStats,
    StderrSink, VecSink, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE,
};

//! Progress events for chunk scanning.
//!
//! The original tool printed per-chunk timing from inside the scan loop.
//! Here that concern is factored into a sink the core notifies but does
//! not depend on: the worker pool calls [`ScanEventSink`] around each
//! job, and the default [`NullSink`] makes the whole thing free.
//!
//! # Thread safety
//!
//! Sinks are called concurrently from every worker thread, so
//! implementations must be `Send + Sync` and should be cheap; a slow sink
//! serializes workers on whatever lock it takes internally.
//!
//! # Ordering
//!
//! Events from different workers interleave arbitrarily. Within one job,
//! `chunk_started` precedes exactly one of `chunk_finished` or
//! `chunk_failed`.

use std::io;
use std::sync::Mutex;
use std::time::Duration;

use super::chunking::Job;

/// Sink for per-chunk progress events.
///
/// All methods default to no-ops so implementations only override what
/// they care about.
pub trait ScanEventSink: Send + Sync {
    /// A worker picked up `job`.
    fn chunk_started(&self, job: &Job) {
        let _ = job;
    }

    /// A worker finished scanning `job` in `elapsed`.
    fn chunk_finished(&self, job: &Job, elapsed: Duration) {
        let _ = (job, elapsed);
    }

    /// Scanning `job` failed with an I/O error.
    fn chunk_failed(&self, job: &Job, error: &io::Error) {
        let _ = (job, error);
    }
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ScanEventSink for NullSink {}

/// Sink that prints one `key=value` line per completed chunk to stderr.
///
/// Each event is a single `eprintln!`, so lines from different workers
/// never interleave at the byte level (stderr is line-locked per call),
/// though their order is non-deterministic.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrSink;

impl ScanEventSink for StderrSink {
    fn chunk_finished(&self, job: &Job, elapsed: Duration) {
        eprintln!(
            "chunk={}/{} range={}..{} elapsed_ms={}",
            job.index + 1,
            job.total,
            job.start,
            job.end,
            elapsed.as_millis()
        );
    }

    fn chunk_failed(&self, job: &Job, error: &io::Error) {
        eprintln!(
            "chunk={}/{} range={}..{} error={}",
            job.index + 1,
            job.total,
            job.start,
            job.end,
            error
        );
    }
}

/// Recorded form of one event, for inspection after a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkEvent {
    Started { index: usize },
    Finished { index: usize },
    Failed { index: usize, kind: io::ErrorKind },
}

/// Sink that records events into a vector, for tests and harnesses.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Mutex<Vec<ChunkEvent>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the recorded events, leaving the sink empty.
    pub fn take(&self) -> Vec<ChunkEvent> {
        std::mem::take(&mut self.events.lock().expect("events lock poisoned"))
    }
}

impl ScanEventSink for VecSink {
    fn chunk_started(&self, job: &Job) {
        self.events
            .lock()
            .expect("events lock poisoned")
            .push(ChunkEvent::Started { index: job.index });
    }

    fn chunk_finished(&self, job: &Job, _elapsed: Duration) {
        self.events
            .lock()
            .expect("events lock poisoned")
            .push(ChunkEvent::Finished { index: job.index });
    }

    fn chunk_failed(&self, job: &Job, error: &io::Error) {
        self.events.lock().expect("events lock poisoned").push(ChunkEvent::Failed {
            index: job.index,
            kind: error.kind(),
        });
    }
}

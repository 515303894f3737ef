//! Run orchestration: chunk planning, the worker pool, progress events,
//! and the streaming serial fallback.

pub mod chunking;
pub mod events;
pub mod parallel_scan;
pub mod serial_scan;

pub use chunking::{compute_offsets, jobs_from_offsets, Job, PlanError, MAX_CHUNK_SIZE};
pub use events::{ChunkEvent, NullSink, ScanEventSink, StderrSink, VecSink};
pub use parallel_scan::{
    count_unique, count_unique_with_sink, ChunkFailure, CountConfig, CountError, FailurePolicy,
    ScanReport, ScanStats, DEFAULT_CHUNK_SIZE,
};
pub use serial_scan::count_unique_serial;

/// Strips one trailing `\n` and one trailing `\r` (in that order), so
/// both `\n` and `\r\n` terminated records reduce to their payload.
///
/// Callers that split on `\n` pass slices without the terminator; the
/// `\n` arm is then simply never taken.
#[inline]
pub(crate) fn trim_line_terminator(raw: &[u8]) -> &[u8] {
    let mut line = raw;
    if let [head @ .., b'\n'] = line {
        line = head;
    }
    if let [head @ .., b'\r'] = line {
        line = head;
    }
    line
}

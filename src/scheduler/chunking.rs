//! Line-aligned chunk planning.
//!
//! Splits a file into byte ranges that can be scanned independently: every
//! range boundary sits immediately after a line terminator (or at offset 0
//! or end-of-file), so no textual record is ever split across two workers.
//!
//! # Offset invariants
//!
//! For `compute_offsets(path, chunk_size)`:
//! - first element is 0, last element equals the file size
//! - strictly increasing
//! - every interior offset immediately follows a `\n`
//!
//! The offset list is built once per run and is read-only afterwards;
//! [`jobs_from_offsets`] turns consecutive pairs into [`Job`]s that tile
//! `[0, file_size)` exactly once.
//!
//! # Over-long lines
//!
//! The forward scan for a line boundary is allowed to run at most one
//! extra chunk past the tentative end. A span greater than twice the
//! configured chunk size means a single line longer than the chunk
//! granularity, which the fixed per-job read buffer cannot safely hold;
//! planning fails with [`PlanError::ChunkTooLarge`] before any worker
//! starts.

use std::fmt;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use memchr::memchr;

/// Upper bound on the configured chunk size (200 MiB).
///
/// Bounds single-job memory: a job buffer never exceeds twice this value.
pub const MAX_CHUNK_SIZE: u64 = 200 * 1024 * 1024;

/// Read block used while probing forward for a line boundary.
const PROBE_BLOCK: usize = 8 * 1024;

// ============================================================================
// Errors
// ============================================================================

/// Errors from chunk-offset planning.
///
/// All planning errors are fatal to the run: they surface before any
/// worker starts and no partial result exists yet.
#[derive(Debug)]
#[non_exhaustive]
pub enum PlanError {
    /// I/O error while statting or probing the file.
    Io(io::Error),
    /// A single line exceeds twice the configured chunk size.
    ChunkTooLarge {
        /// Chunk start offset at which planning gave up.
        start_offset: u64,
        /// Distance from `start_offset` to the next line boundary.
        span: u64,
        /// The configured chunk size the span was measured against.
        chunk_size: u64,
    },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::ChunkTooLarge {
                start_offset,
                span,
                chunk_size,
            } => write!(
                f,
                "line spanning {span} bytes at offset {start_offset} exceeds \
                 twice the chunk size ({chunk_size})"
            ),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// One line-aligned byte range, consumed by exactly one worker.
///
/// No two jobs overlap and together they cover `[0, file_size)` exactly
/// once. `index` and `total` exist for diagnostics (progress events),
/// not for scheduling; workers pull jobs in no particular order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Job {
    /// Inclusive start offset.
    pub start: u64,
    /// Exclusive end offset.
    pub end: u64,
    /// Zero-based sequence index of this job.
    pub index: usize,
    /// Total job count for the run.
    pub total: usize,
}

impl Job {
    /// Byte length of the range.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range is empty. Planning never emits empty jobs; this
    /// exists to keep `len` honest for clippy and callers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Builds the job list from a planned offset list.
///
/// An offset list of length `n` yields `n - 1` jobs; the empty-file list
/// `[0]` yields none.
pub fn jobs_from_offsets(offsets: &[u64]) -> Vec<Job> {
    let total = offsets.len().saturating_sub(1);
    offsets
        .windows(2)
        .enumerate()
        .map(|(index, pair)| Job {
            start: pair[0],
            end: pair[1],
            index,
            total,
        })
        .collect()
}

// ============================================================================
// Planning
// ============================================================================

/// Computes line-aligned chunk offsets for `path`.
///
/// Walks the file once: each tentative boundary at `start + chunk_size`
/// is pushed forward to just past the next `\n` (or clamped to end-of-file
/// for the final chunk). See the module docs for the resulting invariants.
///
/// # Errors
///
/// - [`PlanError::Io`] if the file cannot be statted, opened, or probed.
/// - [`PlanError::ChunkTooLarge`] if a boundary adjustment travels more
///   than `2 * chunk_size` from the chunk start.
///
/// # Panics
///
/// Panics if `chunk_size` is zero (always a config bug at the call site).
pub fn compute_offsets(path: &Path, chunk_size: u64) -> Result<Vec<u64>, PlanError> {
    assert!(chunk_size > 0, "chunk_size must be > 0");

    let file_size = std::fs::metadata(path).map_err(PlanError::Io)?.len();

    let mut offsets = Vec::with_capacity((file_size / chunk_size) as usize + 2);
    offsets.push(0u64);

    let mut file = File::open(path).map_err(PlanError::Io)?;

    let mut start = 0u64;
    while start < file_size {
        let tentative = start.saturating_add(chunk_size);
        let end = if tentative >= file_size {
            file_size
        } else {
            let adjusted = next_line_boundary(&mut file, tentative, file_size)?;
            let span = adjusted - start;
            if span > chunk_size.saturating_mul(2) {
                return Err(PlanError::ChunkTooLarge {
                    start_offset: start,
                    span,
                    chunk_size,
                });
            }
            adjusted
        };
        offsets.push(end);
        start = end;
    }

    Ok(offsets)
}

/// Returns the offset just past the first `\n` at or after `from`, or
/// `file_size` when no terminator remains.
fn next_line_boundary(file: &mut File, from: u64, file_size: u64) -> Result<u64, PlanError> {
    file.seek(SeekFrom::Start(from)).map_err(PlanError::Io)?;

    let mut block = [0u8; PROBE_BLOCK];
    let mut pos = from;
    loop {
        let n = match file.read(&mut block) {
            Ok(0) => return Ok(file_size),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(PlanError::Io(e)),
        };
        if let Some(i) = memchr(b'\n', &block[..n]) {
            return Ok(pos + i as u64 + 1);
        }
        pos += n as u64;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    /// Checks the offset invariants against the actual file bytes.
    fn assert_offsets_valid(offsets: &[u64], content: &[u8]) {
        assert_eq!(offsets[0], 0, "first offset must be 0");
        assert_eq!(
            *offsets.last().unwrap(),
            content.len() as u64,
            "last offset must equal file size"
        );
        for pair in offsets.windows(2) {
            assert!(pair[0] < pair[1], "offsets must be strictly increasing");
        }
        for &off in &offsets[1..offsets.len() - 1] {
            assert_eq!(
                content[off as usize - 1],
                b'\n',
                "interior offset {off} does not follow a line terminator"
            );
        }
    }

    #[test]
    fn offsets_are_line_aligned() {
        let content = b"192.168.0.1\n10.0.0.1\n172.16.5.9\n8.8.8.8\n1.1.1.1\n";
        let f = fixture(content);

        for chunk_size in [1u64, 4, 7, 12, 64, 1024] {
            let offsets = compute_offsets(f.path(), chunk_size).unwrap();
            assert_offsets_valid(&offsets, content);
        }
    }

    #[test]
    fn empty_file_plans_to_single_offset() {
        let f = fixture(b"");
        let offsets = compute_offsets(f.path(), 16).unwrap();
        assert_eq!(offsets, vec![0]);
        assert!(jobs_from_offsets(&offsets).is_empty());
    }

    #[test]
    fn missing_trailing_terminator_is_covered() {
        let content = b"1.1.1.1\n2.2.2.2";
        let f = fixture(content);

        let offsets = compute_offsets(f.path(), 8).unwrap();
        assert_offsets_valid(&offsets, content);
        // The unterminated tail is still inside exactly one chunk.
        assert_eq!(*offsets.last().unwrap(), content.len() as u64);
    }

    #[test]
    fn one_giant_chunk_covers_whole_file() {
        let content = b"1.1.1.1\n2.2.2.2\n";
        let f = fixture(content);

        let offsets = compute_offsets(f.path(), 1 << 20).unwrap();
        assert_eq!(offsets, vec![0, content.len() as u64]);
    }

    #[test]
    fn over_long_line_fails_planning() {
        // 64 bytes, no terminator anywhere, chunk size 8: the boundary
        // probe travels 64 > 16 bytes from offset 0.
        let content = vec![b'1'; 64];
        let f = fixture(&content);

        match compute_offsets(f.path(), 8) {
            Err(PlanError::ChunkTooLarge {
                start_offset,
                span,
                chunk_size,
            }) => {
                assert_eq!(start_offset, 0);
                assert_eq!(span, 64);
                assert_eq!(chunk_size, 8);
            }
            other => panic!("expected ChunkTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn over_long_interior_line_reports_its_chunk_start() {
        let mut content = Vec::new();
        content.extend_from_slice(b"1.1.1.1\n"); // 8 bytes, two clean chunks
        content.extend_from_slice(&vec![b'x'; 100]); // unterminated monster
        let f = fixture(&content);

        // chunk_size 4: the first boundary adjusts cleanly to offset 8,
        // then the probe from offset 12 runs 100 bytes without a hit.
        match compute_offsets(f.path(), 4) {
            Err(PlanError::ChunkTooLarge { start_offset, span, .. }) => {
                assert_eq!(start_offset, 8);
                assert_eq!(span, 100);
            }
            other => panic!("expected ChunkTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = compute_offsets(Path::new("/nonexistent/ipcount-fixture"), 8).unwrap_err();
        assert!(matches!(err, PlanError::Io(_)));
    }

    #[test]
    fn jobs_tile_the_file_exactly() {
        let content = b"1.1.1.1\n2.2.2.2\n3.3.3.3\n4.4.4.4\n";
        let f = fixture(content);

        let offsets = compute_offsets(f.path(), 10).unwrap();
        let jobs = jobs_from_offsets(&offsets);

        assert_eq!(jobs.len(), offsets.len() - 1);
        assert_eq!(jobs[0].start, 0);
        assert_eq!(jobs.last().unwrap().end, content.len() as u64);
        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.index, i);
            assert_eq!(job.total, jobs.len());
            assert!(!job.is_empty());
        }
        for pair in jobs.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "jobs must tile without gaps");
        }
    }

    #[test]
    #[should_panic(expected = "chunk_size must be > 0")]
    fn zero_chunk_size_panics() {
        let f = fixture(b"1.1.1.1\n");
        let _ = compute_offsets(f.path(), 0);
    }
}

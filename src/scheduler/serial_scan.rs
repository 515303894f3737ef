//! Single-threaded streaming scan.
//!
//! No chunk planning, no workers: one buffered pass over the file,
//! sharing the codec and presence bitmap with the parallel path. Because
//! there is no per-job buffer, this mode has no line-length limit — it
//! handles inputs the chunked planner would reject as
//! [`ChunkTooLarge`](super::chunking::PlanError::ChunkTooLarge).
//!
//! Malformed lines are skipped and counted, same as the parallel path,
//! so both modes agree byte-for-byte on every input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::ipv4;
use crate::presence::PresenceBitmap;
use crate::scheduler::parallel_scan::{CountError, ScanReport, ScanStats};
use crate::scheduler::trim_line_terminator;

/// Read buffer for the streaming pass.
const READ_BUF: usize = 1 << 20;

/// Counts distinct valid IPv4 addresses in `path` on the calling thread.
///
/// # Errors
///
/// [`CountError::Io`] on open or read failure. Stream errors are fatal
/// here: there is no per-chunk isolation to contain them.
pub fn count_unique_serial(path: &Path) -> Result<ScanReport, CountError> {
    let file = File::open(path).map_err(CountError::Io)?;
    let mut reader = BufReader::with_capacity(READ_BUF, file);

    let bitmap = PresenceBitmap::new();
    let mut stats = ScanStats::default();
    let mut unique = 0u64;
    let mut raw: Vec<u8> = Vec::new();

    loop {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw).map_err(CountError::Io)?;
        if n == 0 {
            break;
        }
        stats.bytes_scanned += n as u64;

        let line = trim_line_terminator(&raw);
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;
        match ipv4::parse(line) {
            Ok(addr) => {
                if bitmap.insert_if_absent(addr) {
                    unique += 1;
                }
            }
            Err(_) => stats.parse_errors += 1,
        }
    }

    Ok(ScanReport {
        unique,
        stats,
        failures: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::parallel_scan::{count_unique, CountConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(content: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn counts_distinct_addresses() {
        let f = fixture(b"192.168.0.1\n192.168.0.1\n192.168.0.2\n192.168.0.2\n");
        let report = count_unique_serial(f.path()).unwrap();
        assert_eq!(report.unique, 2);
        assert_eq!(report.stats.lines, 4);
    }

    #[test]
    fn skips_malformed_lines() {
        let f = fixture(b"invalidIP\n192.168.0.1\n");
        let report = count_unique_serial(f.path()).unwrap();
        assert_eq!(report.unique, 1);
        assert_eq!(report.stats.parse_errors, 1);
    }

    #[test]
    fn empty_file_counts_zero() {
        let f = fixture(b"");
        let report = count_unique_serial(f.path()).unwrap();
        assert_eq!(report.unique, 0);
        assert_eq!(report.stats, ScanStats::default());
    }

    #[test]
    fn unterminated_and_crlf_lines() {
        let f = fixture(b"1.2.3.4\r\n5.6.7.8");
        let report = count_unique_serial(f.path()).unwrap();
        assert_eq!(report.unique, 2);
    }

    #[test]
    fn handles_lines_longer_than_any_chunk_guard() {
        // A 1 MiB garbage line is fatal to the planner at small chunk
        // sizes but merely a parse error here.
        let mut content = vec![b'z'; 1 << 20];
        content.push(b'\n');
        content.extend_from_slice(b"9.9.9.9\n");
        let f = fixture(&content);

        let report = count_unique_serial(f.path()).unwrap();
        assert_eq!(report.unique, 1);
        assert_eq!(report.stats.parse_errors, 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = count_unique_serial(Path::new("/nonexistent/ipcount-fixture")).unwrap_err();
        assert!(matches!(err, CountError::Io(_)));
    }

    #[test]
    fn agrees_with_the_parallel_scanner() {
        let mut content = Vec::new();
        for i in 0..200u32 {
            content.extend_from_slice(format!("172.16.{}.{}\n", i % 16, i % 5).as_bytes());
        }
        content.extend_from_slice(b"not-an-address\n");
        let f = fixture(&content);

        let serial = count_unique_serial(f.path()).unwrap();
        let parallel = count_unique(&CountConfig {
            chunk_size: 64,
            workers: 4,
            ..CountConfig::new(f.path())
        })
        .unwrap();

        assert_eq!(serial.unique, parallel.unique);
        assert_eq!(serial.stats.lines, parallel.stats.lines);
        assert_eq!(serial.stats.parse_errors, parallel.stats.parse_errors);
    }
}

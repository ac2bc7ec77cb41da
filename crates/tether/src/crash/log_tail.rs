//! The slice of the application log written since startup.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

const COPY_CHUNK: usize = 4096;

/// Byte range of the log to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogWindow {
    /// First byte to copy.
    pub start: u64,
    /// Number of bytes to copy.
    pub len: u64,
}

/// Computes the window `[start, end)` bounded to `max_bytes`.
///
/// The window always ends at `end`, so the oldest bytes are dropped first. A
/// startup offset past the end (the log was truncated or rotated) restarts
/// from the beginning of the file.
#[must_use]
pub const fn log_tail_window(startup_offset: u64, end: u64, max_bytes: u64) -> LogWindow {
    let from = if startup_offset > end { 0 } else { startup_offset };
    let available = end.saturating_sub(from);
    let len = if available < max_bytes { available } else { max_bytes };
    LogWindow {
        start: end.saturating_sub(len),
        len,
    }
}

/// Copies the log tail from `source` into a new `destination` file.
///
/// Uses a fixed stack buffer so it can run from the crash handler.
pub(crate) fn copy_log_tail(
    source: &Path,
    startup_offset: u64,
    max_bytes: u64,
    destination: &Path,
) -> io::Result<u64> {
    let mut input = File::open(source)?;
    let window = log_tail_window(startup_offset, input.metadata()?.len(), max_bytes);
    input.seek(SeekFrom::Start(window.start))?;
    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)?;
    let mut limited = input.take(window.len);
    let mut chunk = [0_u8; COPY_CHUNK];
    let mut copied = 0_u64;
    loop {
        let read = limited.read(&mut chunk)?;
        let Some(bytes) = chunk.get(..read).filter(|bytes| !bytes.is_empty()) else {
            break;
        };
        output.write_all(bytes)?;
        copied = copied.saturating_add(read as u64);
    }
    output.flush()?;
    Ok(copied)
}

/// Reads the log tail into memory.
pub(crate) fn read_log_tail(source: &Path, startup_offset: u64, max_bytes: u64) -> io::Result<Vec<u8>> {
    let mut input = File::open(source)?;
    let window = log_tail_window(startup_offset, input.metadata()?.len(), max_bytes);
    input.seek(SeekFrom::Start(window.start))?;
    let mut bytes = Vec::new();
    input.take(window.len).read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    #[rstest]
    #[case::whole_run(10, 50, 100, LogWindow { start: 10, len: 40 })]
    #[case::budget_keeps_newest(10, 50, 15, LogWindow { start: 35, len: 15 })]
    #[case::rotated_log(80, 50, 100, LogWindow { start: 0, len: 50 })]
    #[case::rotated_and_bounded(80, 50, 20, LogWindow { start: 30, len: 20 })]
    #[case::nothing_new(50, 50, 100, LogWindow { start: 50, len: 0 })]
    #[case::zero_budget(0, 50, 0, LogWindow { start: 50, len: 0 })]
    fn window_ends_at_eof(
        #[case] startup_offset: u64,
        #[case] end: u64,
        #[case] max_bytes: u64,
        #[case] expected: LogWindow,
    ) {
        assert_eq!(log_tail_window(startup_offset, end, max_bytes), expected);
    }

    #[test]
    fn copies_bounded_tail() {
        let temp = tempfile::tempdir().expect("temp dir");
        let log = temp.path().join("app.log");
        let snapshot = temp.path().join("crashlog_1");
        let body: Vec<u8> = b"abcdefghijklmnopqrstuvwxyz"
            .iter()
            .copied()
            .cycle()
            .take(10_000)
            .collect();
        fs::write(&log, &body).expect("write log");
        let copied = copy_log_tail(&log, 100, 5_000, &snapshot).expect("copy");
        assert_eq!(copied, 5_000);
        let captured = fs::read(&snapshot).expect("read snapshot");
        assert_eq!(captured.as_slice(), body.get(5_000..).expect("tail"));
    }

    #[test]
    fn reads_tail_since_startup() {
        let temp = tempfile::tempdir().expect("temp dir");
        let log = temp.path().join("app.log");
        fs::write(&log, b"previous run\nthis run\n").expect("write log");
        let tail = read_log_tail(&log, 13, 1024).expect("read");
        assert_eq!(tail, b"this run\n");
    }
}

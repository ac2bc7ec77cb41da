//! The application log file shared by tracing and the crash handler.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tether_config::LOG_BOUNDARY;
use tracing_subscriber::fmt::MakeWriter;

use crate::crash::{CrashLog, read_log_tail};

/// Append-only application log.
///
/// Opening an existing, non-empty log appends the run boundary marker. The
/// file length after that is the startup offset: everything past it belongs
/// to this run.
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    startup_offset: u64,
    writer: Mutex<BufWriter<File>>,
}

impl LogFile {
    /// Opens or creates the log at `path`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from opening the file or writing the boundary.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > 0 {
            writeln!(file, "{LOG_BOUNDARY}")?;
            file.flush()?;
        }
        let startup_offset = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            startup_offset,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// File length when this run started.
    #[must_use]
    pub const fn startup_offset(&self) -> u64 {
        self.startup_offset
    }

    /// Flushes buffered records.
    ///
    /// # Errors
    ///
    /// Propagates the flush error.
    pub fn flush(&self) -> io::Result<()> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }

    /// Text logged by this run, bounded to the newest `max_bytes`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from flushing or reading the file.
    pub fn current_log_text(&self, max_bytes: u64) -> io::Result<String> {
        self.flush()?;
        let bytes = read_log_tail(&self.path, self.startup_offset, max_bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write_record(&self, record: &[u8]) -> io::Result<()> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(record)
    }
}

impl CrashLog for LogFile {
    fn try_flush(&self) {
        // Never block: the crashing thread may hold the lock.
        if let Ok(mut writer) = self.writer.try_lock() {
            drop(writer.flush());
        }
    }

    fn try_append(&self, line: &[u8]) {
        if let Ok(mut writer) = self.writer.try_lock() {
            drop(writer.write_all(line).and_then(|()| writer.flush()));
        }
    }

    fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn startup_offset(&self) -> u64 {
        self.startup_offset
    }
}

/// [`MakeWriter`] over a shared [`LogFile`].
#[derive(Debug, Clone)]
pub struct SharedLogFile(Arc<LogFile>);

impl SharedLogFile {
    /// Wraps `log`.
    #[must_use]
    pub const fn new(log: Arc<LogFile>) -> Self {
        Self(log)
    }
}

/// Writer for one tracing record.
#[derive(Debug)]
pub struct LogRecordWriter<'a>(&'a LogFile);

impl Write for LogRecordWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_record(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedLogFile {
    type Writer = LogRecordWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogRecordWriter(&self.0)
    }
}

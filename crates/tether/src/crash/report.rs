//! Work done on the crashing thread.
//!
//! Everything the handler needs is computed when the reporter is built, so
//! the crash path only formats into stack buffers and writes files.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::dump::{DumpFlags, Fault, write_dump};
use super::errors::CrashError;
use super::id::{CrashId, ModuleResolver, SystemModuleResolver};
use super::log_tail::copy_log_tail;
use super::protocol::ClientMessage;
use super::text::StackText;

const CORRELATION_PREFIX: &str = "crashinfo_";
const LOG_SNAPSHOT_PREFIX: &str = "crashlog_";
/// Extension of dump files.
pub const DUMP_EXTENSION: &str = "dmp";

/// Correlation file for a crash of `pid`.
#[must_use]
pub fn correlation_file(crash_dir: &Path, pid: u32) -> PathBuf {
    crash_dir.join(format!("{CORRELATION_PREFIX}{pid}"))
}

/// Log snapshot file for a crash of `pid`.
#[must_use]
pub fn log_snapshot_file(crash_dir: &Path, pid: u32) -> PathBuf {
    crash_dir.join(format!("{LOG_SNAPSHOT_PREFIX}{pid}"))
}

/// The application log as seen from the crash handler.
pub trait CrashLog: Send + Sync {
    /// Flushes buffered records without blocking.
    fn try_flush(&self);

    /// Appends `line` and flushes, unless the log is busy.
    ///
    /// Must not block or allocate: the crashing thread may hold the log or
    /// heap lock.
    fn try_append(&self, line: &[u8]);

    /// Log file on disk.
    fn path(&self) -> &Path;

    /// File length when this process started logging.
    fn startup_offset(&self) -> u64;
}

/// Inputs for a [`CrashReporter`].
#[derive(Debug, Clone)]
pub struct CrashSettings {
    /// Directory receiving dumps, correlation files and log snapshots.
    pub crash_dir: PathBuf,
    /// Application version written to the correlation file.
    pub version: String,
    /// Capture full process memory.
    pub full_memory: bool,
    /// Budget for the log snapshot.
    pub max_log_bytes: u64,
}

/// Precomputed crash-time state for one process.
pub struct CrashReporter {
    pid: u32,
    version: String,
    flags: DumpFlags,
    dump_path: PathBuf,
    correlation_path: PathBuf,
    log_snapshot_path: PathBuf,
    max_log_bytes: u64,
    resolver: Box<dyn ModuleResolver>,
    log: Option<Arc<dyn CrashLog>>,
    watcher: Option<UnixStream>,
    crashed_line: Vec<u8>,
}

impl CrashReporter {
    /// Builds a reporter for the current process.
    ///
    /// # Errors
    ///
    /// Returns [`CrashError::Encode`] if the watcher notification cannot be
    /// prepared.
    pub fn new(settings: &CrashSettings, log: Option<Arc<dyn CrashLog>>) -> Result<Self, CrashError> {
        Self::with_resolver(settings, log, Box::new(SystemModuleResolver), std::process::id())
    }

    /// Builds a reporter with an explicit resolver and pid.
    ///
    /// # Errors
    ///
    /// See [`CrashReporter::new`].
    pub fn with_resolver(
        settings: &CrashSettings,
        log: Option<Arc<dyn CrashLog>>,
        resolver: Box<dyn ModuleResolver>,
        pid: u32,
    ) -> Result<Self, CrashError> {
        let dump_path = settings
            .crash_dir
            .join(Uuid::new_v4().to_string())
            .with_extension(DUMP_EXTENSION);
        let crashed_line = ClientMessage::Crashed {
            pid,
            dump: dump_path.clone(),
        }
        .to_line()?;
        Ok(Self {
            pid,
            version: settings.version.clone(),
            flags: DumpFlags::for_request(settings.full_memory),
            correlation_path: correlation_file(&settings.crash_dir, pid),
            log_snapshot_path: log_snapshot_file(&settings.crash_dir, pid),
            dump_path,
            max_log_bytes: settings.max_log_bytes,
            resolver,
            log,
            watcher: None,
            crashed_line,
        })
    }

    /// Notifies `stream` from the crash path.
    #[must_use]
    pub fn with_watcher(mut self, stream: UnixStream) -> Self {
        self.watcher = Some(stream);
        self
    }

    /// Dump file this reporter will write.
    #[must_use]
    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    /// Dump flags in effect.
    #[must_use]
    pub const fn flags(&self) -> DumpFlags {
        self.flags
    }

    /// Records a crash. Returns whether the dump was written.
    ///
    /// Correlation, log snapshot and watcher notification are best effort and
    /// do not affect the result.
    pub fn on_crash(&self, signal: i32, address: usize) -> bool {
        let fault = Fault {
            pid: self.pid,
            signal,
            address,
        };
        let dumped = write_dump(&self.dump_path, &fault, self.flags).is_ok();
        let id = if dumped {
            let id = CrashId::for_address(self.resolver.as_ref(), address);
            self.write_correlation(&id);
            Some(id)
        } else {
            None
        };
        self.log_crash(signal, address, id.as_ref());
        self.snapshot_log();
        if let Some(stream) = &self.watcher {
            drop((&*stream).write_all(&self.crashed_line));
        }
        dumped
    }

    fn write_correlation(&self, id: &CrashId) {
        let mut text = StackText::<512>::new();
        if write!(text, "{}\n{}\n", self.version, id).is_err() {
            return;
        }
        if let Ok(mut file) = File::create(&self.correlation_path) {
            drop(file.write_all(text.as_bytes()));
        }
    }

    fn log_crash(&self, signal: i32, address: usize, id: Option<&CrashId>) {
        let Some(log) = &self.log else {
            return;
        };
        let mut line = StackText::<256>::new();
        let crash_id = id.map_or("none", CrashId::as_str);
        if writeln!(
            line,
            "process crashed: signal={signal} address={address:#x} crash_id={crash_id}"
        )
        .is_ok()
        {
            log.try_append(line.as_bytes());
        }
    }

    fn snapshot_log(&self) {
        let Some(log) = &self.log else {
            return;
        };
        log.try_flush();
        drop(copy_log_tail(
            log.path(),
            log.startup_offset(),
            self.max_log_bytes,
            &self.log_snapshot_path,
        ));
    }
}

impl std::fmt::Debug for CrashReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashReporter")
            .field("pid", &self.pid)
            .field("dump_path", &self.dump_path)
            .field("flags", &self.flags)
            .field("watched", &self.watcher.is_some())
            .finish_non_exhaustive()
    }
}

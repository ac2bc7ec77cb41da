//! Crash capture for the main process and crash serving for the watcher.
//!
//! The client side installs a signal handler that writes a dump, a
//! correlation file naming the faulting module, and a snapshot of this run's
//! log, then tells the watcher. The watcher side waits for that client,
//! files the reports once it goes away and offers a restart.
//!
//! The watcher is spawned before the handler is installed and nothing
//! synchronises the two, so a crash in that window is not captured.

mod dump;
mod errors;
mod handler;
mod id;
mod log_tail;
mod notifier;
mod protocol;
mod readiness;
mod report;
mod server;
mod text;

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::panic;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

pub use dump::{DumpFlags, Fault};
pub use errors::CrashError;
pub use id::{CrashId, ModuleResolver, ResolvedModule, SystemModuleResolver, UNKNOWN_CRASH_ID};
pub use log_tail::{LogWindow, log_tail_window};
pub(crate) use log_tail::read_log_tail;
pub use notifier::{CrashNotifier, TerminalNotifier};
pub use protocol::ClientMessage;
pub use readiness::{READY_TIMEOUT, wait_for_ready};
pub use report::{
    CrashLog, CrashReporter, CrashSettings, DUMP_EXTENSION, correlation_file, log_snapshot_file,
};
pub use server::{
    CLIENT_CONNECT_TIMEOUT, CrashArtifacts, CrashServer, CrashServerPaths, ServeOutcome,
};

pub(crate) const CRASH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::crash");

/// Whether crashes are reported to a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashMode {
    /// A watcher acknowledged the client.
    Watched,
    /// No watcher answered; crashes are still captured locally.
    InProcess,
}

/// Installed crash handling for this process.
#[derive(Debug)]
pub struct CrashSupervisor {
    reporter: &'static CrashReporter,
    mode: CrashMode,
}

impl CrashSupervisor {
    /// Installs the process-wide crash handler.
    ///
    /// Waits up to [`READY_TIMEOUT`] for the watcher at `pipe` to signal
    /// readiness through `ready`. Without it the handler still runs, in
    /// process mode.
    ///
    /// # Errors
    ///
    /// Fails when a handler is already installed or a signal cannot be
    /// registered.
    pub fn install(
        pipe: &Path,
        ready: &Path,
        settings: &CrashSettings,
        log: Option<Arc<dyn CrashLog>>,
    ) -> Result<Self, CrashError> {
        let prepared = CrashReporter::new(settings, log)?;
        let (reporter, mode) = match connect_if_ready(pipe, ready) {
            Some(stream) => (prepared.with_watcher(stream), CrashMode::Watched),
            None => (prepared, CrashMode::InProcess),
        };
        let installed = handler::install(reporter)?;
        install_panic_hook();
        info!(
            target: CRASH_TARGET,
            mode = ?mode,
            dump = %installed.dump_path().display(),
            flags = ?installed.flags(),
            "crash handler installed"
        );
        Ok(Self {
            reporter: installed,
            mode,
        })
    }

    /// Reporting mode.
    #[must_use]
    pub const fn mode(&self) -> CrashMode {
        self.mode
    }

    /// Dump file a crash would produce.
    #[must_use]
    pub fn dump_path(&self) -> &Path {
        self.reporter.dump_path()
    }
}

fn connect_if_ready(pipe: &Path, ready: &Path) -> Option<UnixStream> {
    if wait_for_ready(ready, READY_TIMEOUT) {
        return connect_watcher(pipe);
    }
    info!(
        target: CRASH_TARGET,
        "crash server not ready; turning into in-process mode"
    );
    None
}

fn connect_watcher(pipe: &Path) -> Option<UnixStream> {
    let hello = ClientMessage::Hello {
        pid: std::process::id(),
    };
    let attempt = hello.to_line().map_err(CrashError::from).and_then(|line| {
        let mut stream =
            UnixStream::connect(pipe).map_err(|source| CrashError::Connection { source })?;
        stream
            .write_all(&line)
            .map_err(|source| CrashError::Connection { source })?;
        Ok(stream)
    });
    match attempt {
        Ok(stream) => Some(stream),
        Err(error) => {
            warn!(
                target: CRASH_TARGET,
                pipe = %pipe.display(),
                error = %error,
                "crash server unreachable; turning into in-process mode"
            );
            None
        }
    }
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        error!(target: CRASH_TARGET, panic = %info, "panic");
        previous(info);
    }));
}

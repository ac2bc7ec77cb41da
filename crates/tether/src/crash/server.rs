//! Crash server hosted by the watcher process.
//!
//! The server serves exactly one client, the process that spawned the
//! watcher. It quits when nobody connects in time, and when the client goes
//! away after reporting a crash it files the artefacts next to the dump and
//! offers a restart.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tether_config::{CRASH_RESTART_SWITCH, Switches};
use tracing::{debug, info, warn};

use crate::files::remove_if_present;
use crate::spawn::ProcessSpawner;

use super::CRASH_TARGET;
use super::errors::CrashError;
use super::notifier::CrashNotifier;
use super::protocol::ClientMessage;
use super::report::{correlation_file, log_snapshot_file};

/// How long the server waits for its client before quitting.
pub const CLIENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(20);

/// Files describing one crash, after renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashArtifacts {
    /// Crashed process.
    pub pid: u32,
    /// Dump file stem, used as the report id.
    pub dump_id: String,
    /// Dump file.
    pub dump: PathBuf,
    /// Correlation file, when one was written.
    pub correlation: Option<PathBuf>,
    /// Log snapshot, when one was written.
    pub log: Option<PathBuf>,
}

/// How a serve session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// No client connected in time.
    NoClient,
    /// The client exited without reporting a crash.
    ClientExited {
        /// Pid announced by the client.
        pid: Option<u32>,
    },
    /// The client crashed.
    Crashed {
        /// Renamed crash files.
        artifacts: CrashArtifacts,
        /// Whether the application was relaunched.
        restarted: bool,
    },
}

/// Where the server lives and what it relaunches.
#[derive(Debug, Clone)]
pub struct CrashServerPaths {
    /// Socket clients connect to.
    pub socket: PathBuf,
    /// Readiness file written once listening.
    pub ready: PathBuf,
    /// Executable relaunched on confirmed restart.
    pub exe_path: PathBuf,
}

/// Listening crash server.
pub struct CrashServer<N, S> {
    paths: CrashServerPaths,
    listener: UnixListener,
    connect_timeout: Duration,
    notifier: N,
    spawner: S,
}

impl<N: CrashNotifier, S: ProcessSpawner> CrashServer<N, S> {
    /// Binds the socket and raises the readiness signal.
    ///
    /// # Errors
    ///
    /// Returns [`CrashError::Bind`] or [`CrashError::Ready`].
    pub fn bind(paths: CrashServerPaths, notifier: N, spawner: S) -> Result<Self, CrashError> {
        let bind_error = |source| CrashError::Bind {
            path: paths.socket.clone(),
            source,
        };
        remove_if_present(&paths.socket).map_err(bind_error)?;
        let listener = UnixListener::bind(&paths.socket)
            .and_then(|listener| listener.set_nonblocking(true).map(|()| listener))
            .map_err(bind_error)?;
        File::create(&paths.ready).map_err(|source| CrashError::Ready {
            path: paths.ready.clone(),
            source,
        })?;
        info!(
            target: CRASH_TARGET,
            socket = %paths.socket.display(),
            "crash server ready"
        );
        Ok(Self {
            paths,
            listener,
            connect_timeout: CLIENT_CONNECT_TIMEOUT,
            notifier,
            spawner,
        })
    }

    /// Overrides [`CLIENT_CONNECT_TIMEOUT`].
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Serves one client session.
    ///
    /// # Errors
    ///
    /// Fails when the client connection cannot be configured or a confirmed
    /// restart cannot be launched.
    pub fn serve(self) -> Result<ServeOutcome, CrashError> {
        let Some(stream) = self.wait_for_client() else {
            info!(
                target: CRASH_TARGET,
                "no crash client connected; quitting"
            );
            return Ok(ServeOutcome::NoClient);
        };
        let session = read_session(stream)?;
        let Some((pid, dump)) = session.crashed else {
            info!(
                target: CRASH_TARGET,
                pid = ?session.hello,
                "crash client exited normally"
            );
            return Ok(ServeOutcome::ClientExited { pid: session.hello });
        };
        let artifacts = file_artifacts(pid, dump);
        info!(
            target: CRASH_TARGET,
            pid,
            dump_id = %artifacts.dump_id,
            "crash report filed"
        );
        let restarted = self.offer_restart(&artifacts)?;
        Ok(ServeOutcome::Crashed {
            artifacts,
            restarted,
        })
    }

    fn wait_for_client(&self) -> Option<UnixStream> {
        let deadline = Instant::now() + self.connect_timeout;
        while Instant::now() < deadline {
            match self.listener.accept() {
                Ok((stream, _)) => return Some(stream),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(error) => {
                    warn!(
                        target: CRASH_TARGET,
                        error = %error,
                        "crash server accept error"
                    );
                    thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }
        None
    }

    fn offer_restart(&self, artifacts: &CrashArtifacts) -> Result<bool, CrashError> {
        if !self.notifier.confirm_restart(artifacts) {
            return Ok(false);
        }
        let args = [Switches::format_flag(CRASH_RESTART_SWITCH)];
        self.spawner.spawn(&self.paths.exe_path, &args)?;
        info!(
            target: CRASH_TARGET,
            program = %self.paths.exe_path.display(),
            "application relaunched after crash"
        );
        Ok(true)
    }
}

impl<N, S> Drop for CrashServer<N, S> {
    fn drop(&mut self) {
        for path in [&self.paths.ready, &self.paths.socket] {
            if let Err(error) = remove_if_present(path) {
                warn!(
                    target: CRASH_TARGET,
                    file = %path.display(),
                    error = %error,
                    "failed to remove crash server file"
                );
            }
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    hello: Option<u32>,
    crashed: Option<(u32, PathBuf)>,
}

fn read_session(stream: UnixStream) -> Result<Session, CrashError> {
    stream
        .set_nonblocking(false)
        .map_err(|source| CrashError::Connection { source })?;
    let mut session = Session::default();
    for read in BufReader::new(stream).lines() {
        let line = match read {
            Ok(line) => line,
            Err(error) => {
                debug!(
                    target: CRASH_TARGET,
                    error = %error,
                    "crash client connection closed"
                );
                break;
            }
        };
        match serde_json::from_str::<ClientMessage>(&line) {
            Ok(ClientMessage::Hello { pid }) => session.hello = Some(pid),
            Ok(ClientMessage::Crashed { pid, dump }) => session.crashed = Some((pid, dump)),
            Err(error) => {
                warn!(
                    target: CRASH_TARGET,
                    error = %error,
                    "ignoring malformed crash message"
                );
            }
        }
    }
    Ok(session)
}

fn file_artifacts(pid: u32, dump: PathBuf) -> CrashArtifacts {
    let crash_dir = dump.parent().map_or_else(PathBuf::new, Path::to_path_buf);
    let dump_id = dump
        .file_stem()
        .map_or_else(|| pid.to_string(), |stem| stem.to_string_lossy().into_owned());
    let correlation = move_artifact(&correlation_file(&crash_dir, pid), &crash_dir.join(&dump_id));
    let mut log_name = OsString::from(&dump_id);
    log_name.push(".log");
    let log = move_artifact(&log_snapshot_file(&crash_dir, pid), &crash_dir.join(log_name));
    CrashArtifacts {
        pid,
        dump_id,
        dump,
        correlation,
        log,
    }
}

fn move_artifact(from: &Path, to: &Path) -> Option<PathBuf> {
    match fs::rename(from, to) {
        Ok(()) => Some(to.to_path_buf()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => None,
        Err(source) => {
            let error = CrashError::Rename {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            };
            warn!(target: CRASH_TARGET, error = %error, "crash artefact left in place");
            None
        }
    }
}

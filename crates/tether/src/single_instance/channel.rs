//! Socket carrying instance messages to the owner.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::INSTANCE_TARGET;
use super::errors::SingleInstanceError;
use super::message::Envelope;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Receives decoded envelopes on the listener thread.
pub(super) trait EnvelopeSink: Send + 'static {
    fn deliver(&mut self, envelope: Envelope);
}

pub(super) struct InstanceListener {
    path: PathBuf,
    listener: UnixListener,
}

impl InstanceListener {
    /// Binds the owner socket. Any existing socket file is stale because the
    /// caller holds the instance lock.
    pub(super) fn bind(path: &Path) -> Result<Self, SingleInstanceError> {
        match fs::remove_file(path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                return Err(SingleInstanceError::Bind {
                    path: path.to_path_buf(),
                    source: error,
                });
            }
            _ => {}
        }
        let listener = UnixListener::bind(path)
            .and_then(|listener| listener.set_nonblocking(true).map(|()| listener))
            .map_err(|source| SingleInstanceError::Bind {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            listener,
        })
    }

    pub(super) fn start<S: EnvelopeSink>(self, sink: S) -> ListenerHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_accept_loop(&self, &flag, sink));
        ListenerHandle {
            shutdown,
            handle: Some(handle),
        }
    }
}

/// Handle to the background listener thread.
pub(super) struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    pub(super) fn stop(mut self) -> Result<(), SingleInstanceError> {
        self.shutdown.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SingleInstanceError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop<S: EnvelopeSink>(listener: &InstanceListener, shutdown: &AtomicBool, mut sink: S) {
    info!(
        target: INSTANCE_TARGET,
        socket = %listener.path.display(),
        "instance listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match listener.listener.accept() {
            Ok((stream, _)) => {
                last_error = None;
                read_envelopes(stream, &mut sink);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: INSTANCE_TARGET,
                        error = %error,
                        "instance accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    match fs::remove_file(&listener.path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => {
            warn!(
                target: INSTANCE_TARGET,
                socket = %listener.path.display(),
                error = %error,
                "failed to remove instance socket"
            );
        }
        _ => {}
    }
}

fn read_envelopes<S: EnvelopeSink>(stream: UnixStream, sink: &mut S) {
    if let Err(error) = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(READ_TIMEOUT)))
    {
        warn!(
            target: INSTANCE_TARGET,
            error = %error,
            "failed to configure instance connection"
        );
        return;
    }
    for read in BufReader::new(stream).lines() {
        let line = match read {
            Ok(line) => line,
            Err(error) => {
                debug!(
                    target: INSTANCE_TARGET,
                    error = %error,
                    "instance connection closed"
                );
                break;
            }
        };
        match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => sink.deliver(envelope),
            Err(error) => {
                warn!(
                    target: INSTANCE_TARGET,
                    error = %error,
                    "ignoring malformed instance message"
                );
            }
        }
    }
}

/// Sends one envelope to the owner listening at `path`.
pub(super) fn send_envelope(path: &Path, envelope: &Envelope) -> Result<(), SingleInstanceError> {
    let mut payload = serde_json::to_vec(envelope)?;
    payload.push(b'\n');
    let mut stream = UnixStream::connect(path).map_err(|source| SingleInstanceError::Send {
        path: path.to_path_buf(),
        source,
    })?;
    stream
        .write_all(&payload)
        .and_then(|()| stream.flush())
        .map_err(|source| SingleInstanceError::Send {
            path: path.to_path_buf(),
            source,
        })
}

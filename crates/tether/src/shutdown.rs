//! Ends the main loop on a termination signal.

use std::io;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{info, warn};

use crate::runtime::QuitHandle;

const SHUTDOWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shutdown");

/// Errors reported while installing the shutdown listener.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener thread could not start.
    #[error("failed to start shutdown listener: {source}")]
    Thread {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Background listener that quits the main loop on the first signal.
#[derive(Debug)]
pub struct ShutdownWatch {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl ShutdownWatch {
    /// Starts listening for `SIGTERM`, `SIGINT` and `SIGHUP`.
    ///
    /// # Errors
    ///
    /// See [`ShutdownError`].
    pub fn start(quit: QuitHandle) -> Result<Self, ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("tether-shutdown".to_owned())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!(
                        target: SHUTDOWN_TARGET,
                        signal,
                        "shutdown signal received"
                    );
                    quit.quit();
                }
            })
            .map_err(|source| ShutdownError::Thread { source })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Stops listening and joins the listener thread.
    pub fn stop(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(target: SHUTDOWN_TARGET, "shutdown listener panicked");
        }
    }
}

impl Drop for ShutdownWatch {
    fn drop(&mut self) {
        self.close();
    }
}

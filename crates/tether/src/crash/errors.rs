//! Error types for crash supervision.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::spawn::SpawnError;

/// Errors raised while installing or serving crash handling.
#[derive(Debug, Error)]
pub enum CrashError {
    /// A crash handler is already installed in this process.
    #[error("crash handler already installed")]
    AlreadyInstalled,
    /// Registering a signal handler failed.
    #[error("failed to register handler for signal {signal}: {source}")]
    Signal {
        /// Signal number.
        signal: i32,
        /// Underlying errno.
        #[source]
        source: Errno,
    },
    /// The alternate signal stack could not be installed.
    #[error("failed to install alternate signal stack: {source}")]
    AltStack {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The crash-handler socket could not be bound.
    #[error("failed to bind crash server at {path}: {source}")]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The readiness signal could not be raised.
    #[error("failed to signal readiness at {path}: {source}")]
    Ready {
        /// Readiness file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Talking to a connected client failed.
    #[error("crash client connection failed: {source}")]
    Connection {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A crash artefact could not be moved next to its dump.
    #[error("failed to move {from} to {to}: {source}")]
    Rename {
        /// Original file.
        from: PathBuf,
        /// Destination.
        to: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Relaunching the application failed.
    #[error(transparent)]
    Restart(#[from] SpawnError),
    /// Encoding a protocol message failed.
    #[error("failed to encode crash message: {0}")]
    Encode(#[from] serde_json::Error),
}

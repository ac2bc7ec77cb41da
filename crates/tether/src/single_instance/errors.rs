use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the single-instance guard.
#[derive(Debug, Error)]
pub enum SingleInstanceError {
    /// The lock file could not be created.
    #[error("failed to create instance lock '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The owner's message socket could not be bound.
    #[error("failed to bind instance socket '{path}': {source}")]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Delivering a message to the owner failed.
    #[error("failed to deliver message to '{path}': {source}")]
    Send {
        /// Socket path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The command-line hand-off file could not be written or read.
    #[error("failed to access command-line hand-off '{path}': {source}")]
    Handoff {
        /// Hand-off file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A message or hand-off payload could not be encoded or decoded.
    #[error("failed to encode instance message: {0}")]
    Encode(#[from] serde_json::Error),
    /// The listener thread panicked.
    #[error("instance listener thread panicked")]
    ThreadPanic,
}

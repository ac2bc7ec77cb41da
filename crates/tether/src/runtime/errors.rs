use std::io;

use thiserror::Error;

/// Errors raised while starting the host runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A worker thread could not be started.
    #[error("failed to start thread '{name}': {source}")]
    Spawn {
        /// Thread name.
        name: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

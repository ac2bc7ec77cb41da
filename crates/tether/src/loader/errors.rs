use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;
use tether_module_api::ModuleKind;

/// Boxed cause reported by a library backend.
pub type BackendError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced while loading a module.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The shared library could not be opened.
    #[error("failed to open module '{path}': {source}")]
    Open {
        /// Library path.
        path: PathBuf,
        /// Backend error.
        #[source]
        source: BackendError,
    },
    /// The library does not export the entry symbol.
    #[error("module '{path}' does not export '{symbol}': {source}")]
    MissingSymbol {
        /// Library path.
        path: PathBuf,
        /// Entry symbol that was looked up.
        symbol: &'static str,
        /// Backend error.
        #[source]
        source: BackendError,
    },
    /// The caller asked for an entry shape the module kind does not have.
    #[error("{kind} module entry '{symbol}' cannot be invoked this way")]
    EntryShape {
        /// Module kind.
        kind: ModuleKind,
        /// Entry symbol of that kind.
        symbol: &'static str,
    },
}

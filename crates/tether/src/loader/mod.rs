//! Loads a module library, resolves its entry symbol and runs it.
//!
//! Every failure is local to the attempt: the loader logs it, returns
//! [`LOAD_FAILURE`] and never retries.

mod errors;
mod hooks;
mod library;

use std::ffi::c_int;
use std::path::{Path, PathBuf};

use tether_module_api::{EntryShape, IntegerEntry, LOAD_FAILURE, ModuleKind, SecretEntry};
use tracing::{error, info};

pub use errors::{BackendError, LoadError};
pub use hooks::{
    LIBRARY_SEARCH_VAR, LaunchHooks, MainModuleHooks, NoopHooks, ProcessEnvironment,
    SystemEnvironment,
};
pub use library::{LibraryLoader, ModuleLibrary, SystemLibrary, SystemLibraryLoader};

pub(crate) const LOADER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::loader");

#[derive(Debug, Clone, Copy)]
enum Entry {
    Integer(IntegerEntry),
    Factory(SecretEntry),
}

/// Exclusive owner of a loaded library and its resolved entry point.
///
/// The entry pointer is only reachable through the handle, so it cannot be
/// called after the library is unloaded.
#[derive(Debug)]
pub struct ModuleHandle<L> {
    kind: ModuleKind,
    path: PathBuf,
    entry: Entry,
    library: L,
}

impl<L: ModuleLibrary> ModuleHandle<L> {
    /// Module kind.
    #[must_use]
    pub const fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Path the library was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Directory containing the library.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Integer entry point, for main and watcher modules.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::EntryShape`] for factory modules.
    pub fn integer_entry(&self) -> Result<IntegerEntry, LoadError> {
        match self.entry {
            Entry::Integer(entry) => Ok(entry),
            Entry::Factory(_) => Err(self.shape_error()),
        }
    }

    /// Factory entry point, for the secret module.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::EntryShape`] for integer modules.
    pub fn factory_entry(&self) -> Result<SecretEntry, LoadError> {
        match self.entry {
            Entry::Factory(entry) => Ok(entry),
            Entry::Integer(_) => Err(self.shape_error()),
        }
    }

    /// Gives up the entry point and returns the library.
    #[must_use]
    pub fn into_library(self) -> L {
        self.library
    }

    const fn shape_error(&self) -> LoadError {
        LoadError::EntryShape {
            kind: self.kind,
            symbol: self.kind.entry_symbol(),
        }
    }
}

/// Loader for one module kind, parameterised by launch hooks.
#[derive(Debug, Clone)]
pub struct DynamicModuleLoader<H, L = SystemLibraryLoader> {
    kind: ModuleKind,
    hooks: H,
    libraries: L,
}

impl<H: LaunchHooks> DynamicModuleLoader<H> {
    /// Builds a loader backed by the system library loader.
    #[must_use]
    pub const fn new(kind: ModuleKind, hooks: H) -> Self {
        Self::with_libraries(kind, hooks, SystemLibraryLoader)
    }
}

impl<H: LaunchHooks, L: LibraryLoader> DynamicModuleLoader<H, L> {
    /// Builds a loader with an explicit library backend.
    #[must_use]
    pub const fn with_libraries(kind: ModuleKind, hooks: H, libraries: L) -> Self {
        Self {
            kind,
            hooks,
            libraries,
        }
    }

    /// Module kind this loader handles.
    #[must_use]
    pub const fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Opens `path` and resolves the kind's entry symbol.
    ///
    /// The library is released again when the symbol is missing.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Open`] or [`LoadError::MissingSymbol`].
    pub fn open(&self, path: &Path) -> Result<ModuleHandle<L::Library>, LoadError> {
        let library = self.libraries.open(path)?;
        let symbol = self.kind.entry_symbol();
        let entry = match self.kind.entry_shape() {
            EntryShape::Integer => Entry::Integer(library.integer_entry(symbol)?),
            EntryShape::Factory => Entry::Factory(library.secret_entry(symbol)?),
        };
        info!(
            target: LOADER_TARGET,
            kind = %self.kind,
            module = %path.display(),
            symbol,
            "module loaded"
        );
        Ok(ModuleHandle {
            kind: self.kind,
            path: path.to_path_buf(),
            entry,
            library,
        })
    }

    /// Loads the module at `path`, runs its entry point between the hooks and
    /// returns the mapped result.
    ///
    /// Returns [`LOAD_FAILURE`] without calling into the module when the
    /// library cannot be opened or lacks its entry symbol. Does not return
    /// until the module's entry point does.
    pub fn launch(&self, path: &Path) -> c_int {
        let handle = match self.open(path) {
            Ok(handle) => handle,
            Err(error) => {
                error!(
                    target: LOADER_TARGET,
                    kind = %self.kind,
                    module = %path.display(),
                    error = %error,
                    "module load failed"
                );
                return LOAD_FAILURE;
            }
        };
        let entry = match handle.integer_entry() {
            Ok(entry) => entry,
            Err(error) => {
                error!(
                    target: LOADER_TARGET,
                    error = %error,
                    "module cannot be launched"
                );
                return LOAD_FAILURE;
            }
        };
        self.hooks.on_before_launch(handle.dir());
        let code = self.hooks.do_launch(entry);
        let mapped = self.hooks.on_before_exit(code);
        drop(handle);
        mapped
    }
}

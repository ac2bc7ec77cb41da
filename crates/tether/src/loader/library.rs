//! Shared-library backend behind the module loader.

use std::path::{Path, PathBuf};

use tether_module_api::{IntegerEntry, SecretEntry};

use super::errors::LoadError;

/// An opened shared library.
///
/// Function pointers returned by the accessors are valid only while the
/// library is alive.
pub trait ModuleLibrary: Send + 'static {
    /// Resolves an integer-returning entry symbol.
    fn integer_entry(&self, symbol: &'static str) -> Result<IntegerEntry, LoadError>;

    /// Resolves a factory entry symbol.
    fn secret_entry(&self, symbol: &'static str) -> Result<SecretEntry, LoadError>;
}

/// Opens shared libraries.
pub trait LibraryLoader {
    /// Library type produced by this loader.
    type Library: ModuleLibrary;

    /// Maps the library at `path` into the process.
    fn open(&self, path: &Path) -> Result<Self::Library, LoadError>;
}

/// Loader backed by `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLibraryLoader;

/// Library opened by [`SystemLibraryLoader`]; unloaded on drop.
#[derive(Debug)]
pub struct SystemLibrary {
    library: libloading::Library,
    path: PathBuf,
}

impl LibraryLoader for SystemLibraryLoader {
    type Library = SystemLibrary;

    fn open(&self, path: &Path) -> Result<Self::Library, LoadError> {
        // SAFETY: module initialisers are part of the module contract; the
        // tether modules run no code at load time.
        let library =
            unsafe { libloading::Library::new(path) }.map_err(|source| LoadError::Open {
                path: path.to_path_buf(),
                source: Box::new(source),
            })?;
        Ok(SystemLibrary {
            library,
            path: path.to_path_buf(),
        })
    }
}

impl SystemLibrary {
    fn missing(&self, symbol: &'static str, source: libloading::Error) -> LoadError {
        LoadError::MissingSymbol {
            path: self.path.clone(),
            symbol,
            source: Box::new(source),
        }
    }
}

impl ModuleLibrary for SystemLibrary {
    fn integer_entry(&self, symbol: &'static str) -> Result<IntegerEntry, LoadError> {
        // SAFETY: the symbol name fixes the exported signature.
        unsafe { self.library.get::<IntegerEntry>(symbol.as_bytes()) }
            .map(|entry| *entry)
            .map_err(|source| self.missing(symbol, source))
    }

    fn secret_entry(&self, symbol: &'static str) -> Result<SecretEntry, LoadError> {
        // SAFETY: the symbol name fixes the exported signature.
        unsafe { self.library.get::<SecretEntry>(symbol.as_bytes()) }
            .map(|entry| *entry)
            .map_err(|source| self.missing(symbol, source))
    }
}

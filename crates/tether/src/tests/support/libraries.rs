//! In-memory stand-ins for shared libraries.

use std::cell::RefCell;
use std::io;
use std::path::Path;

use tether_module_api::{IntegerEntry, RawSecretModule, SecretEntry};

use super::Journal;
use crate::loader::{LibraryLoader, LoadError, ModuleLibrary};

/// What a fake library exports.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FakeModule {
    /// Opening fails.
    Unopenable,
    /// Opens, but exports nothing.
    NoSymbols,
    /// Exports an integer entry.
    Integer(IntegerEntry),
    /// Exports a factory entry.
    Factory(SecretEntry),
}

/// Loader handing out [`FakeLibrary`] values. Records "open" and "unload".
#[derive(Debug, Clone)]
pub(crate) struct FakeLibraries {
    module: FakeModule,
    journal: Journal,
}

impl FakeLibraries {
    pub(crate) const fn new(module: FakeModule, journal: Journal) -> Self {
        Self { module, journal }
    }
}

#[derive(Debug)]
pub(crate) struct FakeLibrary {
    module: FakeModule,
    journal: Journal,
}

impl Drop for FakeLibrary {
    fn drop(&mut self) {
        self.journal.record("unload");
    }
}

impl LibraryLoader for FakeLibraries {
    type Library = FakeLibrary;

    fn open(&self, path: &Path) -> Result<Self::Library, LoadError> {
        if matches!(self.module, FakeModule::Unopenable) {
            return Err(LoadError::Open {
                path: path.to_path_buf(),
                source: Box::new(io::Error::new(io::ErrorKind::NotFound, "no such module")),
            });
        }
        self.journal.record("open");
        Ok(FakeLibrary {
            module: self.module,
            journal: self.journal.clone(),
        })
    }
}

impl FakeLibrary {
    fn missing(symbol: &'static str) -> LoadError {
        LoadError::MissingSymbol {
            path: "fake".into(),
            symbol,
            source: Box::new(io::Error::new(io::ErrorKind::NotFound, "undefined symbol")),
        }
    }
}

impl ModuleLibrary for FakeLibrary {
    fn integer_entry(&self, symbol: &'static str) -> Result<IntegerEntry, LoadError> {
        match self.module {
            FakeModule::Integer(entry) => Ok(entry),
            _ => Err(Self::missing(symbol)),
        }
    }

    fn secret_entry(&self, symbol: &'static str) -> Result<SecretEntry, LoadError> {
        match self.module {
            FakeModule::Factory(entry) => Ok(entry),
            _ => Err(Self::missing(symbol)),
        }
    }
}

thread_local! {
    static NEXT_SECRET: RefCell<Option<RawSecretModule>> = const { RefCell::new(None) };
}

/// Makes the next [`queued_secret_factory`] call on this thread return `raw`.
pub(crate) fn queue_secret_module(raw: RawSecretModule) -> SecretEntry {
    NEXT_SECRET.with(|slot| *slot.borrow_mut() = Some(raw));
    queued_secret_factory
}

unsafe extern "C" fn queued_secret_factory() -> RawSecretModule {
    NEXT_SECRET
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(RawSecretModule::null)
}

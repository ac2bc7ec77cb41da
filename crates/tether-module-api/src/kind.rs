use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::ffi::{OsString, c_int};

use strum::{Display, EnumString};

use crate::ffi::RawSecretModule;

/// Signature of the `AppMainEntry` and `AppModuleEntry` exports.
pub type IntegerEntry = unsafe extern "C" fn() -> c_int;

/// Signature of the `AppSecretEntry` factory export.
pub type SecretEntry = unsafe extern "C" fn() -> RawSecretModule;

/// Symbol exported by the main module.
pub const MAIN_ENTRY_SYMBOL: &str = "AppMainEntry";
/// Symbol exported by the watcher module.
pub const WATCHER_ENTRY_SYMBOL: &str = "AppModuleEntry";
/// Symbol exported by the secret module.
pub const SECRET_ENTRY_SYMBOL: &str = "AppSecretEntry";

/// The three loadable module stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ModuleKind {
    /// Interactive application logic.
    Main,
    /// Crash server and recovery prompt.
    Watcher,
    /// Background services sharing the host runtime.
    Secret,
}

/// Calling convention of a module's entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryShape {
    /// No arguments; returns a process result code.
    Integer,
    /// No arguments; returns a reference-counted module object.
    Factory,
}

impl ModuleKind {
    /// Case-sensitive name of the module's entry symbol.
    #[must_use]
    pub const fn entry_symbol(self) -> &'static str {
        match self {
            Self::Main => MAIN_ENTRY_SYMBOL,
            Self::Watcher => WATCHER_ENTRY_SYMBOL,
            Self::Secret => SECRET_ENTRY_SYMBOL,
        }
    }

    /// Entry symbol shape for this kind.
    #[must_use]
    pub const fn entry_shape(self) -> EntryShape {
        match self {
            Self::Main | Self::Watcher => EntryShape::Integer,
            Self::Secret => EntryShape::Factory,
        }
    }

    /// Library stem as produced by cargo for the module crate.
    #[must_use]
    pub const fn library_stem(self) -> &'static str {
        match self {
            Self::Main => "tether_main",
            Self::Watcher => "tether_watcher",
            Self::Secret => "tether_secret",
        }
    }

    /// Platform file name of the module library, e.g. `libtether_main.so`.
    #[must_use]
    pub fn library_file_name(self) -> OsString {
        OsString::from(format!(
            "{DLL_PREFIX}{}{DLL_SUFFIX}",
            self.library_stem()
        ))
    }
}

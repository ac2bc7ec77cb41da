//! Contract between the tether host and its dynamically loaded modules.
//!
//! A module is a shared library exporting exactly one entry symbol. The
//! symbol and its signature are fixed per [`ModuleKind`]: the main and
//! watcher modules export an integer-returning runner, and the secret module
//! exports a factory returning a reference-counted [`RawSecretModule`].
//!
//! The host lends its scheduling primitives to the secret module as
//! [`RawTaskRunner`] tables. The module borrows them, never frees them and
//! must drop every use before its `uninitialize` returns.

mod export;
mod ffi;
mod host;
mod kind;
mod result;
mod secret;

pub use ffi::{RawHostServices, RawSecretModule, RawTask, RawTaskRunner};
pub use host::{HostServices, TaskRunner};
pub use kind::{
    EntryShape, IntegerEntry, MAIN_ENTRY_SYMBOL, ModuleKind, SECRET_ENTRY_SYMBOL, SecretEntry,
    WATCHER_ENTRY_SYMBOL,
};
pub use result::{LOAD_FAILURE, ResultCode};
pub use secret::{SecretModule, into_raw};

//! Bootstrap layer for the tether desktop application.
//!
//! The launcher executable carries no application logic. It decides its
//! role from the command line, arbitrates single-instance ownership, spawns
//! a crash watcher and then loads the main module from a shared library.
//! The main module in turn installs crash capture, builds the host runtime
//! and lends it to the secret module.
//!
//! Components:
//!
//! - [`loader`]: opens module libraries and runs their entry points between
//!   injectable launch hooks.
//! - [`bootstrap`]: role selection, watcher spawning and the launcher
//!   sequence.
//! - [`single_instance`]: lock-file ownership, activation and command-line
//!   hand-off between instances.
//! - [`crash`]: signal-driven crash capture in the main process and the crash
//!   server hosted by the watcher.
//! - [`runtime`] and [`secret`]: the host scheduling primitives and their
//!   loan to the secret module across the library boundary.
//! - [`stages`]: the bodies of the main and watcher module entry points.
//!
//! Only Unix targets are supported.

#[cfg(not(unix))]
compile_error!("tether supports Unix targets only");

pub mod bootstrap;
mod context;
pub mod crash;
mod files;
mod log_file;
pub mod loader;
pub mod runtime;
pub mod secret;
pub mod single_instance;
mod shutdown;
mod spawn;
pub mod stages;
pub mod telemetry;

pub use bootstrap::{BootstrapPlan, ProcessRole, run_bootstrap, run_bootstrap_with};
pub use context::{APP_VERSION, AppContext, AppPaths, ContextError};
pub use log_file::{LogFile, LogRecordWriter, SharedLogFile};
pub use shutdown::{ShutdownError, ShutdownWatch};
pub use spawn::{ProcessSpawner, SpawnError, SystemProcessSpawner};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;

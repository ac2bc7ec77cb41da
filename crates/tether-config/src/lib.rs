//! Shared configuration for the tether launcher, watcher and modules.
//!
//! Configuration is layered by [`ortho_config`]: defaults, then an optional
//! configuration file, then `TETHER_*` environment variables. Process
//! switches such as `--app-type` are not configuration; they are parsed
//! separately by [`Switches`] so that the launcher can forward unknown
//! arguments to a running instance.

mod defaults;
mod directories;
mod logging;
mod switches;

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    APP_NAME, DEBUG_CONSOLE_LOG_FILTER, DEFAULT_LOG_FILTER, default_data_dir, default_log_filter,
    default_log_format,
};
pub use directories::{AppDirectories, DirectoryError, PREFERENCES_FILE_NAME, RuntimePaths};
pub use logging::{
    LOG_BOUNDARY, LOG_FILE_NAME, LogFormat, LogFormatParseError, MAX_CRASH_LOG_BYTES,
};
pub use switches::{
    APP_TYPE_SWITCH, APP_WATCHER_VALUE, CRASH_RESTART_SWITCH, DEBUG_CONSOLE_SWITCH,
    FULL_MINIDUMP_SWITCH, PARENT_PID_SWITCH, Switches,
};

/// Layered configuration shared by every tether process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TETHER")]
pub struct Config {
    /// `tracing` filter expression.
    pub log_filter: Option<String>,
    /// Output format for log records.
    pub log_format: Option<LogFormat>,
    /// Root directory for persistent state.
    pub data_dir: Option<Utf8PathBuf>,
}

impl Config {
    /// Loads configuration from files and the environment only.
    ///
    /// Process switches never reach the configuration parser; only the
    /// program name is supplied as the argument vector.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when a source is malformed.
    pub fn load_layers() -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter([OsString::from(APP_NAME)])
    }

    /// Effective log filter, honouring the `debug-console` switch.
    #[must_use]
    pub fn log_filter_for(&self, switches: &Switches) -> &str {
        match self.log_filter.as_deref() {
            Some(filter) => filter,
            None if switches.debug_console => DEBUG_CONSOLE_LOG_FILTER,
            None => default_log_filter(),
        }
    }

    /// Effective log filter without switch adjustments.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Effective log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Effective data directory.
    #[must_use]
    pub fn data_dir(&self) -> Utf8PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

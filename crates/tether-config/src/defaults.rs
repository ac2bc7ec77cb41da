use camino::Utf8PathBuf;
use std::env;

use crate::logging::LogFormat;

/// Application name used for directory and IPC naming.
pub const APP_NAME: &str = "tether";

/// Default log filter expression used by the launcher and modules.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Filter applied when the `debug-console` switch is present.
pub const DEBUG_CONSOLE_LOG_FILTER: &str = "debug";

/// Default log filter expression used by the launcher and modules.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default data directory, e.g. `~/.local/share/tether`.
#[must_use]
pub fn default_data_dir() -> Utf8PathBuf {
    let base = dirs::data_local_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join(APP_NAME)
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

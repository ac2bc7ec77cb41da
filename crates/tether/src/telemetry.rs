//! Structured telemetry initialisation.
//!
//! The launcher logs to stderr. Modules log to the application log file and
//! mirror records to stderr when the debug console is requested. Each loaded
//! module carries its own copy of the tracing globals, so every stage
//! initialises telemetry for itself.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tether_config::{AppDirectories, Config, LogFormat, Switches};
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{
    self,
    writer::{BoxMakeWriter, MakeWriterExt},
};

use crate::log_file::{LogFile, SharedLogFile};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Proof that a subscriber is installed for this process or module.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Reasons telemetry could not be set up.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter expression does not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber already owns the global default.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
    /// The application log could not be opened.
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Where records go.
#[derive(Debug, Clone)]
pub enum LogSink {
    /// Standard error only.
    Stderr,
    /// The application log, optionally mirrored to stderr.
    File {
        /// Shared log file.
        log: Arc<LogFile>,
        /// Mirror records to stderr.
        mirror_to_stderr: bool,
    },
}

/// Installs the global subscriber for `sink` once per image.
///
/// Once a subscriber is installed, later calls return without touching it.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an invalid filter and
/// [`TelemetryError::Subscriber`] when another subscriber is already set.
pub fn initialise(
    filter: &str,
    format: LogFormat,
    sink: &LogSink,
) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(filter, format, sink))
        .map(|_| TelemetryHandle)
}

/// Initialises stderr telemetry for the launcher.
///
/// # Errors
///
/// See [`initialise`].
pub fn initialise_launcher(
    config: &Config,
    switches: &Switches,
) -> Result<TelemetryHandle, TelemetryError> {
    initialise(
        config.log_filter_for(switches),
        config.log_format(),
        &LogSink::Stderr,
    )
}

/// Opens the application log and initialises file telemetry for a module.
///
/// # Errors
///
/// Returns [`TelemetryError::LogFile`] when the log cannot be opened, or any
/// error from [`initialise`].
pub fn initialise_module(
    config: &Config,
    switches: &Switches,
    directories: &AppDirectories,
) -> Result<Arc<LogFile>, TelemetryError> {
    let path = directories.log_file();
    let log = LogFile::open(path)
        .map(Arc::new)
        .map_err(|source| TelemetryError::LogFile {
            path: path.to_path_buf(),
            source,
        })?;
    let sink = LogSink::File {
        log: Arc::clone(&log),
        mirror_to_stderr: switches.debug_console,
    };
    initialise(config.log_filter_for(switches), config.log_format(), &sink)?;
    Ok(log)
}

fn sink_writer(sink: &LogSink) -> (BoxMakeWriter, bool) {
    match sink {
        LogSink::Stderr => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal()),
        LogSink::File {
            log,
            mirror_to_stderr: false,
        } => (BoxMakeWriter::new(SharedLogFile::new(Arc::clone(log))), false),
        LogSink::File {
            log,
            mirror_to_stderr: true,
        } => (
            BoxMakeWriter::new(SharedLogFile::new(Arc::clone(log)).and(io::stderr)),
            false,
        ),
    }
}

fn install_subscriber(
    filter: &str,
    format: LogFormat,
    sink: &LogSink,
) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_new(filter).map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let (writer, ansi) = sink_writer(sink);

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_writer(writer)
        // Colour codes only make sense on an interactive terminal.
        .with_ansi(ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn invalid_filter_is_rejected() {
        let error = install_subscriber("tether=loud", LogFormat::Compact, &LogSink::Stderr)
            .expect_err("filter must fail");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }

    #[test]
    fn mirrored_sink_still_writes_the_log_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let log = Arc::new(LogFile::open(&temp.path().join("app.log")).expect("open log"));
        let sink = LogSink::File {
            log: Arc::clone(&log),
            mirror_to_stderr: true,
        };
        let (writer, ansi) = sink_writer(&sink);
        assert!(!ansi);
        writer
            .make_writer()
            .write_all(b"mirrored record\n")
            .expect("write record");
        let text = log.current_log_text(1024).expect("log text");
        assert_eq!(text, "mirrored record\n");
    }
}

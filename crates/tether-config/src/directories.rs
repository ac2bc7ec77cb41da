//! Derives the on-disk layout shared by the launcher, the watcher and the
//! loaded modules.
//!
//! Every process resolves the same directories independently, so the layout
//! must be a pure function of the configuration and the environment.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;
use crate::defaults::APP_NAME;
use crate::logging::LOG_FILE_NAME;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

const USER_DATA_DIR: &str = "User Data";
const GLOBAL_PROFILE_DIR: &str = "Global";
const CRASH_DIR: &str = "Crash Reports";
const HANDOFF_FILE: &str = "tether-command-line-v1.json";

/// Name of the preferences file inside a profile directory.
pub const PREFERENCES_FILE_NAME: &str = "Preferences";

/// Persistent directories below the configured data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirectories {
    user_data_dir: PathBuf,
    global_profile_dir: PathBuf,
    crash_dir: PathBuf,
    log_file: PathBuf,
}

impl AppDirectories {
    /// Derives the layout from the configured data directory.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::under(config.data_dir().as_std_path())
    }

    /// Derives the layout below an explicit data directory.
    #[must_use]
    pub fn under(data_dir: &Path) -> Self {
        let user_data_dir = data_dir.join(USER_DATA_DIR);
        Self {
            global_profile_dir: user_data_dir.join(GLOBAL_PROFILE_DIR),
            crash_dir: user_data_dir.join(CRASH_DIR),
            log_file: user_data_dir.join(LOG_FILE_NAME),
            user_data_dir,
        }
    }

    /// Creates every directory in the layout.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Create`] when a directory cannot be created.
    pub fn prepare(&self) -> Result<(), DirectoryError> {
        for dir in [&self.user_data_dir, &self.global_profile_dir, &self.crash_dir] {
            create_dir(dir)?;
        }
        Ok(())
    }

    /// Root of all per-user state.
    #[must_use]
    pub fn user_data_dir(&self) -> &Path {
        self.user_data_dir.as_path()
    }

    /// Profile directory shared by the main and secret modules.
    #[must_use]
    pub fn global_profile_dir(&self) -> &Path {
        self.global_profile_dir.as_path()
    }

    /// Directory receiving crash reports and their companion files.
    #[must_use]
    pub fn crash_dir(&self) -> &Path {
        self.crash_dir.as_path()
    }

    /// Application log file.
    #[must_use]
    pub fn log_file(&self) -> &Path {
        self.log_file.as_path()
    }
}

/// Per-session IPC artefacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    instance_lock: PathBuf,
    instance_socket: PathBuf,
    crash_socket: PathBuf,
    crash_ready: PathBuf,
    command_line_handoff: PathBuf,
}

impl RuntimePaths {
    /// Resolves the runtime directory for the current user and creates it.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Create`] when the directory cannot be created.
    pub fn system() -> Result<Self, DirectoryError> {
        let paths = Self::new(default_runtime_directory());
        create_dir(&paths.runtime_dir)?;
        Ok(paths)
    }

    /// Builds the layout rooted at `runtime_dir`.
    ///
    /// The hand-off file lives beside the lock so one user's leftover file
    /// never collides with another user's in a shared temp directory.
    #[must_use]
    pub fn new(runtime_dir: PathBuf) -> Self {
        Self {
            instance_lock: runtime_dir.join("instance.lock"),
            instance_socket: runtime_dir.join("instance.sock"),
            crash_socket: runtime_dir.join("crash-handler.sock"),
            crash_ready: runtime_dir.join("crash-handler.ready"),
            command_line_handoff: runtime_dir.join(HANDOFF_FILE),
            runtime_dir,
        }
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Lock file standing in for the single-instance mutex.
    #[must_use]
    pub fn instance_lock(&self) -> &Path {
        self.instance_lock.as_path()
    }

    /// Socket on which the owning instance receives messages.
    #[must_use]
    pub fn instance_socket(&self) -> &Path {
        self.instance_socket.as_path()
    }

    /// Socket on which the watcher's crash server listens.
    #[must_use]
    pub fn crash_socket(&self) -> &Path {
        self.crash_socket.as_path()
    }

    /// File signalling that the crash server is listening.
    #[must_use]
    pub fn crash_ready(&self) -> &Path {
        self.crash_ready.as_path()
    }

    /// Temporary file used to forward a command line to the owner.
    #[must_use]
    pub fn command_line_handoff(&self) -> &Path {
        self.command_line_handoff.as_path()
    }
}

fn create_dir(path: &Path) -> Result<(), DirectoryError> {
    fs::create_dir_all(path).map_err(|source| DirectoryError::Create {
        path: path.to_path_buf(),
        source,
    })
}

fn default_runtime_directory() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push(APP_NAME);
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push(APP_NAME);
        dir.push(format!("uid-{}", unsafe { geteuid() }));
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push(APP_NAME);
        dir
    }
}

/// Errors raised while preparing directories.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Creating a directory failed.
    #[error("failed to prepare directory '{path}': {source}")]
    Create {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

//! The secret profile's preference store.
//!
//! Loading happens on the host's profile runner. Writes stay in memory until
//! [`PreferenceStore::commit`].

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tether_module_api::TaskRunner;
use thiserror::Error;
use tracing::{debug, warn};

use crate::SECRET_TARGET;

/// File name of the secret profile's preferences.
pub const SECRET_PREFERENCES_FILE: &str = "Secret Preference";

/// Errors raised by the preference store.
#[derive(Debug, Error)]
pub enum PrefsError {
    /// The preferences file could not be read.
    #[error("failed to read preferences at {path}: {source}")]
    Read {
        /// Preferences file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The preferences file is not a JSON object.
    #[error("malformed preferences at {path}: {source}")]
    Parse {
        /// Preferences file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Encoding the preferences failed.
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
    /// The preferences file could not be written.
    #[error("failed to write preferences at {path}: {source}")]
    Write {
        /// Preferences file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Default)]
struct PrefsState {
    values: Map<String, Value>,
    loaded: bool,
    dirty: bool,
}

/// JSON preferences backed by one file.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
    state: Arc<Mutex<PrefsState>>,
}

impl PreferenceStore {
    /// Store for the preferences in `profile_dir`.
    #[must_use]
    pub fn in_profile(profile_dir: &Path) -> Self {
        Self {
            path: profile_dir.join(SECRET_PREFERENCES_FILE),
            state: Arc::new(Mutex::new(PrefsState::default())),
        }
    }

    /// Preferences file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues the initial load on `runner`. Returns `false` if the runner
    /// refused the task.
    pub fn load_async(&self, runner: &TaskRunner) -> bool {
        let store = self.clone();
        runner.post(move || store.load_now())
    }

    fn load_now(&self) {
        let values = match read_values(&self.path) {
            Ok(values) => values,
            Err(error) => {
                warn!(
                    target: SECRET_TARGET,
                    error = %error,
                    "starting with empty preferences"
                );
                Map::new()
            }
        };
        let mut state = self.lock();
        // Values set before the load finished win over stored ones.
        for (key, value) in values {
            state.values.entry(key).or_insert(value);
        }
        state.loaded = true;
        debug!(
            target: SECRET_TARGET,
            file = %self.path.display(),
            keys = state.values.len(),
            "preferences loaded"
        );
    }

    /// Whether the initial load has finished.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.lock().loaded
    }

    /// Current value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().values.get(key).cloned()
    }

    /// Sets `key`, to be persisted on the next commit.
    pub fn set(&self, key: &str, value: Value) {
        let mut state = self.lock();
        state.values.insert(key.to_owned(), value);
        state.dirty = true;
    }

    /// Writes pending changes. Does nothing when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns [`PrefsError::Encode`] or [`PrefsError::Write`].
    pub fn commit(&self) -> Result<(), PrefsError> {
        let mut state = self.lock();
        if !state.dirty {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(&state.values)?;
        write_atomically(&self.path, &bytes).map_err(|source| PrefsError::Write {
            path: self.path.clone(),
            source,
        })?;
        state.dirty = false;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, PrefsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_values(path: &Path) -> Result<Map<String, Value>, PrefsError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(source) => {
            return Err(PrefsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes).map_err(|source| PrefsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "preferences path has no parent")
    })?;
    fs::create_dir_all(directory)?;
    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

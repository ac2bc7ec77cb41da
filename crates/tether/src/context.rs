//! Explicit application context resolved once at process start.
//!
//! Every stage (launcher, watcher, main module) builds its own context from
//! the running executable and passes it down by reference.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tether_config::{AppDirectories, Config, RuntimePaths, Switches};
use tether_module_api::ModuleKind;

/// Version stamped into crash correlation files and module directories.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Executable and module locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    exe_path: PathBuf,
    exe_dir: PathBuf,
    main_module_dir: PathBuf,
    version: String,
}

impl AppPaths {
    /// Derives the layout for `exe_path`.
    ///
    /// Modules live beside the executable when the main module library is
    /// present there; otherwise they live in a subdirectory named after the
    /// version.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingParent`] when `exe_path` has no parent.
    pub fn derive(exe_path: PathBuf, version: &str) -> Result<Self, ContextError> {
        let exe_dir = exe_path
            .parent()
            .ok_or_else(|| ContextError::MissingParent {
                path: exe_path.clone(),
            })?
            .to_path_buf();
        let main_module_dir = if exe_dir.join(ModuleKind::Main.library_file_name()).is_file() {
            exe_dir.clone()
        } else {
            exe_dir.join(version)
        };
        Ok(Self {
            exe_path,
            exe_dir,
            main_module_dir,
            version: version.to_owned(),
        })
    }

    /// Path of the running executable.
    #[must_use]
    pub fn exe_path(&self) -> &Path {
        self.exe_path.as_path()
    }

    /// Directory containing the executable.
    #[must_use]
    pub fn exe_dir(&self) -> &Path {
        self.exe_dir.as_path()
    }

    /// Directory holding the current module generation.
    #[must_use]
    pub fn main_module_dir(&self) -> &Path {
        self.main_module_dir.as_path()
    }

    /// Executable version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Absolute path of the library for `kind`.
    #[must_use]
    pub fn module_path(&self, kind: ModuleKind) -> PathBuf {
        self.main_module_dir.join(kind.library_file_name())
    }
}

/// Everything a process stage needs to know about itself.
#[derive(Debug, Clone)]
pub struct AppContext {
    paths: AppPaths,
    switches: Switches,
    config: Config,
    directories: AppDirectories,
    runtime: RuntimePaths,
}

impl AppContext {
    /// Resolves the context for the running executable.
    ///
    /// # Errors
    ///
    /// Fails when the executable path or runtime directory cannot be resolved.
    pub fn resolve(switches: Switches, config: Config) -> Result<Self, ContextError> {
        let exe_path = std::env::current_exe().map_err(|source| ContextError::ExePath { source })?;
        let paths = AppPaths::derive(exe_path, APP_VERSION)?;
        let runtime = RuntimePaths::system().map_err(ContextError::Runtime)?;
        let directories = AppDirectories::from_config(&config);
        Ok(Self::from_parts(paths, switches, config, directories, runtime))
    }

    /// Assembles a context from explicit parts.
    #[must_use]
    pub const fn from_parts(
        paths: AppPaths,
        switches: Switches,
        config: Config,
        directories: AppDirectories,
        runtime: RuntimePaths,
    ) -> Self {
        Self {
            paths,
            switches,
            config,
            directories,
            runtime,
        }
    }

    /// Executable and module locations.
    #[must_use]
    pub const fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Switches the process was started with.
    #[must_use]
    pub const fn switches(&self) -> &Switches {
        &self.switches
    }

    /// Layered configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Persistent directory layout.
    #[must_use]
    pub const fn directories(&self) -> &AppDirectories {
        &self.directories
    }

    /// Per-session IPC artefacts.
    #[must_use]
    pub const fn runtime(&self) -> &RuntimePaths {
        &self.runtime
    }
}

/// Errors raised while resolving the context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The executable path could not be determined.
    #[error("failed to resolve executable path: {source}")]
    ExePath {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The executable path has no parent directory.
    #[error("executable path '{path}' has no parent directory")]
    MissingParent {
        /// Offending path.
        path: PathBuf,
    },
    /// The runtime directory could not be prepared.
    #[error(transparent)]
    Runtime(tether_config::DirectoryError),
}

//! Extension points wrapped around a module entry call.

use std::env;
use std::ffi::{OsStr, OsString, c_int};
use std::io;
use std::path::Path;

use tether_module_api::{IntegerEntry, ResultCode};
use tracing::{info, warn};

use super::LOADER_TARGET;

/// Environment variable the dynamic linker consults for dependent libraries.
#[cfg(target_os = "windows")]
pub const LIBRARY_SEARCH_VAR: &str = "PATH";
/// Environment variable the dynamic linker consults for dependent libraries.
#[cfg(target_os = "macos")]
pub const LIBRARY_SEARCH_VAR: &str = "DYLD_LIBRARY_PATH";
/// Environment variable the dynamic linker consults for dependent libraries.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const LIBRARY_SEARCH_VAR: &str = "LD_LIBRARY_PATH";

/// Strategy invoked by the loader around the entry call.
pub trait LaunchHooks {
    /// Prepares the process before the module runs.
    fn on_before_launch(&self, module_dir: &Path) {
        let _ = module_dir;
    }

    /// Calls the entry point.
    fn do_launch(&self, entry: IntegerEntry) -> c_int {
        // SAFETY: the entry was resolved from a live library by symbol name,
        // which fixes its signature.
        unsafe { entry() }
    }

    /// Maps the entry point's return value.
    fn on_before_exit(&self, code: c_int) -> c_int {
        code
    }
}

/// Hooks that leave process state untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl LaunchHooks for NoopHooks {}

/// Process-wide state mutated before the main module runs.
pub trait ProcessEnvironment: Send + Sync {
    /// Changes the working directory.
    fn set_current_dir(&self, dir: &Path) -> io::Result<()>;

    /// Reads an environment variable.
    fn var_os(&self, key: &str) -> Option<OsString>;

    /// Writes an environment variable.
    fn set_var(&self, key: &str, value: &OsStr);
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnvironment;

impl ProcessEnvironment for SystemEnvironment {
    fn set_current_dir(&self, dir: &Path) -> io::Result<()> {
        env::set_current_dir(dir)
    }

    fn var_os(&self, key: &str) -> Option<OsString> {
        env::var_os(key)
    }

    fn set_var(&self, key: &str, value: &OsStr) {
        // Environment mutation is unsafe in the 2024 edition. The launcher
        // performs it on the main thread before the module starts any
        // threads of its own.
        unsafe { env::set_var(key, value) };
    }
}

/// Hooks used for the main module.
///
/// The module directory becomes the working directory and is prepended to
/// the library search path, since a directory change alone does not make the
/// dynamic linker find the module's own dependencies.
#[derive(Debug, Default, Clone)]
pub struct MainModuleHooks<E = SystemEnvironment> {
    environment: E,
}

impl<E: ProcessEnvironment> MainModuleHooks<E> {
    /// Builds hooks over `environment`.
    #[must_use]
    pub const fn new(environment: E) -> Self {
        Self { environment }
    }

    /// Environment the hooks mutate.
    #[must_use]
    pub const fn environment(&self) -> &E {
        &self.environment
    }

    fn prepend_search_path(&self, module_dir: &Path) {
        let existing = self.environment.var_os(LIBRARY_SEARCH_VAR);
        let mut entries = vec![module_dir.to_path_buf()];
        if let Some(existing) = existing.as_deref() {
            entries.extend(env::split_paths(existing).filter(|entry| entry != module_dir));
        }
        match env::join_paths(entries) {
            Ok(joined) => {
                self.environment.set_var(LIBRARY_SEARCH_VAR, &joined);
                info!(
                    target: LOADER_TARGET,
                    variable = LIBRARY_SEARCH_VAR,
                    dir = %module_dir.display(),
                    "module directory prepended to library search path"
                );
            }
            Err(error) => {
                warn!(
                    target: LOADER_TARGET,
                    variable = LIBRARY_SEARCH_VAR,
                    error = %error,
                    "library search path left unchanged"
                );
            }
        }
    }
}

impl<E: ProcessEnvironment> LaunchHooks for MainModuleHooks<E> {
    fn on_before_launch(&self, module_dir: &Path) {
        if let Err(error) = self.environment.set_current_dir(module_dir) {
            warn!(
                target: LOADER_TARGET,
                dir = %module_dir.display(),
                error = %error,
                "failed to enter module directory"
            );
        }
        self.prepend_search_path(module_dir);
    }

    fn on_before_exit(&self, code: c_int) -> c_int {
        match ResultCode::from_code(code) {
            Some(result) => {
                info!(
                    target: LOADER_TARGET,
                    code,
                    result = ?result,
                    "main module returned"
                );
                code
            }
            None => {
                warn!(
                    target: LOADER_TARGET,
                    code,
                    "main module returned an unknown code"
                );
                ResultCode::ErrorOccurred.code()
            }
        }
    }
}

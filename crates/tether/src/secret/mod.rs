//! Host side of the secret module.
//!
//! The bridge loads the module, lends it the host runtime and tears it down
//! in a fixed order: `uninitialize`, revoke the lent runners, release the
//! object, then hand the library to the runtime so it is unloaded only after
//! the runners have stopped.

mod lending;

use std::path::{Path, PathBuf};

use tether_module_api::{ModuleKind, RawSecretModule};
use thiserror::Error;
use tracing::{info, warn};

use crate::loader::{DynamicModuleLoader, LibraryLoader, LoadError, NoopHooks, SystemLibraryLoader};
use crate::runtime::HostRuntime;

use lending::LentServices;

const SECRET_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::secret");

/// Errors raised while bringing up the secret module.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The library could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The factory returned a null or incomplete object.
    #[error("secret module factory in {path} returned no object")]
    Factory {
        /// Module path.
        path: PathBuf,
    },
    /// The profile directory cannot cross the boundary.
    #[error("profile directory {path} is not valid UTF-8")]
    ProfilePath {
        /// Offending directory.
        path: PathBuf,
    },
    /// The module rejected the host services.
    #[error("secret module in {path} failed to initialise")]
    Initialize {
        /// Module path.
        path: PathBuf,
    },
}

/// Loads secret modules.
#[derive(Debug, Clone)]
pub struct SecretModuleBridge<L = SystemLibraryLoader> {
    loader: DynamicModuleLoader<NoopHooks, L>,
}

impl SecretModuleBridge {
    /// Builds a bridge backed by the system library loader.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_libraries(SystemLibraryLoader)
    }
}

impl Default for SecretModuleBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: LibraryLoader> SecretModuleBridge<L> {
    /// Builds a bridge over an explicit library backend.
    #[must_use]
    pub const fn with_libraries(libraries: L) -> Self {
        Self {
            loader: DynamicModuleLoader::with_libraries(ModuleKind::Secret, NoopHooks, libraries),
        }
    }

    /// Loads the module at `module_path` and initialises it with runners
    /// borrowed from `runtime`.
    ///
    /// On failure the partially constructed object is released without
    /// `uninitialize`, and the host carries on without the module.
    ///
    /// # Errors
    ///
    /// See [`SecretError`].
    pub fn load<'rt>(
        &self,
        runtime: &'rt HostRuntime,
        module_path: &Path,
        profile_dir: &Path,
    ) -> Result<SecretModule<'rt>, SecretError> {
        let handle = self.loader.open(module_path)?;
        let factory = handle.factory_entry()?;
        // SAFETY: the factory signature is fixed by the entry symbol and the
        // library stays loaded while `handle` lives.
        let raw = unsafe { factory() };
        if !raw.is_complete() {
            release_raw(raw);
            return Err(SecretError::Factory {
                path: module_path.to_path_buf(),
            });
        }
        let Some(lent) = LentServices::new(runtime, profile_dir).map(Box::new) else {
            release_raw(raw);
            return Err(SecretError::ProfilePath {
                path: profile_dir.to_path_buf(),
            });
        };
        let mut module = SecretModule {
            runtime,
            raw,
            lent,
            library: Some(Box::new(handle.into_library())),
            initialized: false,
        };
        let services = module.lent.as_raw();
        let instance = module.raw.instance;
        // SAFETY: `services` and the runners it points at outlive the call;
        // the table was checked complete above.
        let accepted = module
            .raw
            .initialize
            .is_some_and(|initialize| unsafe { initialize(instance, &raw const services) });
        if !accepted {
            // Dropping `module` releases the object without `uninitialize`.
            return Err(SecretError::Initialize {
                path: module_path.to_path_buf(),
            });
        }
        module.initialized = true;
        info!(
            target: SECRET_TARGET,
            module = %module_path.display(),
            "secret module initialised"
        );
        Ok(module)
    }
}

/// Loads the secret module, logging and discarding any failure.
pub fn load_or_continue<'rt, L: LibraryLoader>(
    bridge: &SecretModuleBridge<L>,
    runtime: &'rt HostRuntime,
    module_path: &Path,
    profile_dir: &Path,
) -> Option<SecretModule<'rt>> {
    match bridge.load(runtime, module_path, profile_dir) {
        Ok(module) => Some(module),
        Err(error) => {
            warn!(
                target: SECRET_TARGET,
                module = %module_path.display(),
                error = %error,
                "continuing without the secret module"
            );
            None
        }
    }
}

/// A live secret module. Dropping it runs the teardown sequence.
pub struct SecretModule<'rt> {
    runtime: &'rt HostRuntime,
    raw: RawSecretModule,
    lent: Box<LentServices<'rt>>,
    library: Option<Box<dyn Send>>,
    initialized: bool,
}

impl SecretModule<'_> {
    /// Whether `initialize` succeeded and `uninitialize` has not run yet.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Tears the module down explicitly.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for SecretModule<'_> {
    fn drop(&mut self) {
        if self.initialized {
            if let Some(uninitialize) = self.raw.uninitialize {
                // SAFETY: `instance` still holds our reference.
                unsafe { uninitialize(self.raw.instance) };
            }
            self.initialized = false;
        }
        self.lent.revoke();
        release_raw(self.raw);
        self.raw = RawSecretModule::null();
        if let Some(library) = self.library.take() {
            self.runtime.retire(library);
        }
        info!(target: SECRET_TARGET, "secret module released");
    }
}

fn release_raw(raw: RawSecretModule) {
    if raw.instance.is_null() {
        return;
    }
    if let Some(release) = raw.release {
        // SAFETY: the host owns exactly one reference from the factory.
        unsafe { release(raw.instance) };
    }
}

//! The tether secret module.
//!
//! Loaded by the main module after the host runtime starts. It adopts the
//! host's profile runner, main-thread runner and thread pool, owns the
//! secret profile's preferences and request context, and gives every runner
//! back during `uninitialize`.

mod module;
mod prefs;
mod request_context;

pub use module::SecretServices;
pub use prefs::{PreferenceStore, PrefsError, SECRET_PREFERENCES_FILE};
pub use request_context::RequestContext;

const SECRET_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::services");

const fn make_module() -> Option<SecretServices> {
    Some(SecretServices::new())
}

tether_module_api::export_secret_entry!(make_module);

#[cfg(test)]
mod tests {
    //! Host runner doubles.

    use std::ffi::c_void;
    use std::ptr;

    use tether_module_api::{RawTask, RawTaskRunner, TaskRunner};

    unsafe extern "C" fn run_inline(_context: *const c_void, task: RawTask) -> bool {
        task.run();
        true
    }

    unsafe extern "C" fn refuse(_context: *const c_void, task: RawTask) -> bool {
        drop(task);
        false
    }

    /// Runner executing every task on the calling thread.
    pub(crate) fn inline_runner() -> TaskRunner {
        // SAFETY: the context is never dereferenced.
        unsafe {
            TaskRunner::from_raw(RawTaskRunner {
                context: ptr::null(),
                post: run_inline,
            })
        }
    }

    /// Runner behaving like one the host has revoked.
    pub(crate) fn refusing_runner() -> TaskRunner {
        // SAFETY: the context is never dereferenced.
        unsafe {
            TaskRunner::from_raw(RawTaskRunner {
                context: ptr::null(),
                post: refuse,
            })
        }
    }

    #[test]
    fn factory_exports_a_complete_table() {
        let raw = super::AppSecretEntry();
        assert!(raw.is_complete());
        if let Some(release) = raw.release {
            // SAFETY: releases the single reference returned by the factory.
            unsafe { release(raw.instance) };
        }
    }
}

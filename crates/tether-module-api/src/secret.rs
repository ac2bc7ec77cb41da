//! Module-side implementation of the secret module object.

use std::ffi::c_void;
use std::sync::{Arc, Mutex, PoisonError};

use crate::ffi::{RawHostServices, RawSecretModule};
use crate::host::HostServices;

/// Behaviour of a secret module's root object.
///
/// `initialize` adopts the host runners. `uninitialize` must drop every
/// [`crate::TaskRunner`] it holds and flush pending writes before returning.
pub trait SecretModule: Send + 'static {
    /// Adopts the host services; returns `false` when the module cannot start.
    fn initialize(&mut self, host: HostServices) -> bool;

    /// Releases the host services.
    fn uninitialize(&mut self);
}

/// Boxes `module` behind a reference-counted table with one reference owned
/// by the caller.
pub fn into_raw<M: SecretModule>(module: M) -> RawSecretModule {
    let instance = Arc::into_raw(Arc::new(Mutex::new(module)));
    RawSecretModule {
        instance: instance.cast_mut().cast(),
        initialize: Some(initialize_shim::<M>),
        uninitialize: Some(uninitialize_shim::<M>),
        add_ref: Some(add_ref_shim::<M>),
        release: Some(release_shim::<M>),
    }
}

unsafe extern "C" fn initialize_shim<M: SecretModule>(
    instance: *mut c_void,
    services: *const RawHostServices,
) -> bool {
    if services.is_null() {
        return false;
    }
    // SAFETY: `instance` was produced by `into_raw::<M>` and is still
    // referenced by the caller; `services` is valid for this call.
    let (module, host) = unsafe {
        (
            &*instance.cast_const().cast::<Mutex<M>>(),
            HostServices::from_raw(&*services),
        )
    };
    let Some(host) = host else {
        return false;
    };
    module
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .initialize(host)
}

unsafe extern "C" fn uninitialize_shim<M: SecretModule>(instance: *mut c_void) {
    // SAFETY: see `initialize_shim`.
    let module = unsafe { &*instance.cast_const().cast::<Mutex<M>>() };
    module
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .uninitialize();
}

unsafe extern "C" fn add_ref_shim<M: SecretModule>(instance: *mut c_void) {
    // SAFETY: `instance` is a live `Arc<Mutex<M>>` pointer.
    unsafe { Arc::increment_strong_count(instance.cast_const().cast::<Mutex<M>>()) };
}

unsafe extern "C" fn release_shim<M: SecretModule>(instance: *mut c_void) {
    // SAFETY: every release pairs with `into_raw` or `add_ref`.
    unsafe { Arc::decrement_strong_count(instance.cast_const().cast::<Mutex<M>>()) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Flags {
        initialized: AtomicBool,
        uninitialized: AtomicBool,
        dropped: AtomicBool,
    }

    struct Tracked(Arc<Flags>);

    impl SecretModule for Tracked {
        fn initialize(&mut self, _host: HostServices) -> bool {
            self.0.initialized.store(true, Ordering::SeqCst);
            true
        }

        fn uninitialize(&mut self) {
            self.0.uninitialized.store(true, Ordering::SeqCst);
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn table_is_complete() {
        let flags = Arc::new(Flags::default());
        let raw = into_raw(Tracked(Arc::clone(&flags)));
        assert!(raw.is_complete());
        unsafe { raw.release.expect("release")(raw.instance) };
        assert!(flags.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn object_survives_until_last_release() {
        let flags = Arc::new(Flags::default());
        let raw = into_raw(Tracked(Arc::clone(&flags)));
        unsafe {
            raw.add_ref.expect("add_ref")(raw.instance);
            raw.release.expect("release")(raw.instance);
        }
        assert!(!flags.dropped.load(Ordering::SeqCst));
        unsafe { raw.uninitialize.expect("uninitialize")(raw.instance) };
        assert!(flags.uninitialized.load(Ordering::SeqCst));
        unsafe { raw.release.expect("release")(raw.instance) };
        assert!(flags.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn null_services_fail_initialize() {
        let flags = Arc::new(Flags::default());
        let raw = into_raw(Tracked(Arc::clone(&flags)));
        let ok = unsafe { raw.initialize.expect("initialize")(raw.instance, std::ptr::null()) };
        assert!(!ok);
        assert!(!flags.initialized.load(Ordering::SeqCst));
        unsafe { raw.release.expect("release")(raw.instance) };
    }
}

//! Macros that export a module's entry symbol with the agreed signature.

/// Exports `AppMainEntry`, running `$run` and returning its [`ResultCode`].
///
/// [`ResultCode`]: crate::ResultCode
#[macro_export]
macro_rules! export_main_entry {
    ($run:path) => {
        /// Entry point of the main module.
        #[unsafe(no_mangle)]
        pub extern "C" fn AppMainEntry() -> ::std::ffi::c_int {
            let code: $crate::ResultCode = $run();
            code.code()
        }
    };
}

/// Exports `AppModuleEntry`, running `$run` and returning its [`ResultCode`].
///
/// [`ResultCode`]: crate::ResultCode
#[macro_export]
macro_rules! export_watcher_entry {
    ($run:path) => {
        /// Entry point of the watcher module.
        #[unsafe(no_mangle)]
        pub extern "C" fn AppModuleEntry() -> ::std::ffi::c_int {
            let code: $crate::ResultCode = $run();
            code.code()
        }
    };
}

/// Exports `AppSecretEntry`, constructing the module with `$make`.
///
/// `$make` returns `Option<impl SecretModule>`; `None` exports a null table.
#[macro_export]
macro_rules! export_secret_entry {
    ($make:path) => {
        /// Factory for the secret module's root object.
        #[unsafe(no_mangle)]
        pub extern "C" fn AppSecretEntry() -> $crate::RawSecretModule {
            match $make() {
                Some(module) => $crate::into_raw(module),
                None => $crate::RawSecretModule::null(),
            }
        }
    };
}

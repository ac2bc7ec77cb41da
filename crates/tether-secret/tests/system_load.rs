//! Loads the built secret module through the system library loader.

use std::path::PathBuf;

use rstest::{fixture, rstest};
use tempfile::TempDir;
use tether::loader::{DynamicModuleLoader, LoadError, NoopHooks};
use tether::runtime::HostRuntime;
use tether::secret::SecretModuleBridge;
use tether_module_api::{LOAD_FAILURE, ModuleKind};

/// The module library cargo builds next to this test's dependencies.
fn built_module() -> PathBuf {
    let exe = std::env::current_exe().expect("test executable path");
    let deps = exe.parent().expect("deps directory");
    let name = ModuleKind::Secret.library_file_name();
    [Some(deps), deps.parent()]
        .into_iter()
        .flatten()
        .map(|dir| dir.join(&name))
        .find(|candidate| candidate.is_file())
        .expect("secret module library should be built alongside the tests")
}

#[fixture]
fn profile() -> TempDir {
    tempfile::tempdir().expect("profile dir")
}

#[rstest]
fn exported_factory_resolves() {
    let loader = DynamicModuleLoader::new(ModuleKind::Secret, NoopHooks);
    let handle = loader.open(&built_module()).expect("module opens");
    assert_eq!(handle.kind(), ModuleKind::Secret);
    assert!(handle.factory_entry().is_ok());
    assert!(matches!(
        handle.integer_entry(),
        Err(LoadError::EntryShape { .. })
    ));
}

#[rstest]
fn built_module_initialises_against_the_host_runtime(profile: TempDir) {
    let runtime = HostRuntime::new(2).expect("runtime");
    let bridge = SecretModuleBridge::new();
    let module = bridge
        .load(&runtime, &built_module(), &profile.path().join("Global"))
        .expect("secret module loads and initialises");
    assert!(module.is_initialized());
    module.shutdown();
    runtime.shutdown();
}

#[rstest]
fn main_loader_finds_no_main_entry() {
    let loader = DynamicModuleLoader::new(ModuleKind::Main, NoopHooks);
    assert_eq!(loader.launch(&built_module()), LOAD_FAILURE);
}

#[rstest]
fn missing_library_fails_to_open(profile: TempDir) {
    let loader = DynamicModuleLoader::new(ModuleKind::Secret, NoopHooks);
    let absent = profile.path().join(ModuleKind::Secret.library_file_name());
    assert!(matches!(loader.open(&absent), Err(LoadError::Open { .. })));
}

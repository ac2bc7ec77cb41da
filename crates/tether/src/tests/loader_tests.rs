//! Module loader behaviour against fake libraries.

use std::cell::Cell;
use std::ffi::{OsString, c_int};
use std::path::{Path, PathBuf};

use rstest::rstest;
use tether_module_api::{IntegerEntry, LOAD_FAILURE, ModuleKind, ResultCode};

use super::support::{FakeLibraries, FakeModule, Journal, MemoryEnvironment};
use crate::loader::{
    DynamicModuleLoader, LIBRARY_SEARCH_VAR, LaunchHooks, LoadError, MainModuleHooks, NoopHooks,
};

thread_local! {
    static ENTRY_CALLS: Cell<usize> = const { Cell::new(0) };
}

unsafe extern "C" fn returns_restart() -> c_int {
    ENTRY_CALLS.with(|calls| calls.set(calls.get() + 1));
    ResultCode::RestartApp.code()
}

unsafe extern "C" fn returns_garbage() -> c_int {
    ENTRY_CALLS.with(|calls| calls.set(calls.get() + 1));
    77
}

fn entry_calls() -> usize {
    ENTRY_CALLS.with(Cell::get)
}

#[derive(Debug, Default)]
struct RecordingHooks {
    journal: Journal,
}

impl LaunchHooks for RecordingHooks {
    fn on_before_launch(&self, module_dir: &Path) {
        self.journal
            .record(&format!("before_launch {}", module_dir.display()));
    }

    fn on_before_exit(&self, code: c_int) -> c_int {
        self.journal.record(&format!("before_exit {code}"));
        code
    }
}

fn module_path() -> PathBuf {
    PathBuf::from("/opt/tether/1.2.3").join(ModuleKind::Main.library_file_name())
}

#[rstest]
#[case::unopenable(FakeModule::Unopenable)]
#[case::missing_symbol(FakeModule::NoSymbols)]
fn failed_load_skips_hooks_and_entry(#[case] module: FakeModule) {
    let journal = Journal::default();
    let hooks = RecordingHooks::default();
    let loader = DynamicModuleLoader::with_libraries(
        ModuleKind::Main,
        hooks,
        FakeLibraries::new(module, journal.clone()),
    );
    let calls_before = entry_calls();

    assert_eq!(loader.launch(&module_path()), LOAD_FAILURE);
    assert_eq!(entry_calls(), calls_before);
    assert!(!journal.contains("open") || journal.contains("unload"));
}

#[test]
fn missing_symbol_reports_the_kind_symbol() {
    let loader = DynamicModuleLoader::with_libraries(
        ModuleKind::Watcher,
        NoopHooks,
        FakeLibraries::new(FakeModule::NoSymbols, Journal::default()),
    );
    let error = loader.open(&module_path()).expect_err("symbol lookup fails");
    match error {
        LoadError::MissingSymbol { symbol, .. } => assert_eq!(symbol, "AppModuleEntry"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn launch_runs_entry_between_hooks() {
    let journal = Journal::default();
    let hooks = RecordingHooks {
        journal: journal.clone(),
    };
    let entry: IntegerEntry = returns_restart;
    let loader = DynamicModuleLoader::with_libraries(
        ModuleKind::Main,
        hooks,
        FakeLibraries::new(FakeModule::Integer(entry), journal.clone()),
    );
    let calls_before = entry_calls();

    let code = loader.launch(&module_path());

    assert_eq!(code, ResultCode::RestartApp.code());
    assert_eq!(entry_calls(), calls_before + 1);
    assert_eq!(
        journal.events(),
        vec![
            "open".to_owned(),
            "before_launch /opt/tether/1.2.3".to_owned(),
            "before_exit 1".to_owned(),
            "unload".to_owned(),
        ]
    );
}

#[test]
fn factory_module_cannot_be_launched() {
    let journal = Journal::default();
    let entry = super::support::queue_secret_module(tether_module_api::RawSecretModule::null());
    let loader = DynamicModuleLoader::with_libraries(
        ModuleKind::Secret,
        NoopHooks,
        FakeLibraries::new(FakeModule::Factory(entry), journal.clone()),
    );
    assert_eq!(loader.launch(&module_path()), LOAD_FAILURE);
    assert!(journal.contains("unload"));
}

#[test]
fn main_hooks_enter_module_directory_and_prepend_search_path() {
    let seeded = MemoryEnvironment::with_var(LIBRARY_SEARCH_VAR, "/usr/lib:/opt/tether/1.2.3");
    let hooks = MainModuleHooks::new(seeded);
    let module_dir = Path::new("/opt/tether/1.2.3");

    hooks.on_before_launch(module_dir);

    let environment = hooks_environment(&hooks);
    assert_eq!(
        environment
            .current_dir
            .lock()
            .expect("environment lock")
            .as_deref(),
        Some(module_dir)
    );
    assert_eq!(
        environment.var(LIBRARY_SEARCH_VAR),
        Some(OsString::from("/opt/tether/1.2.3:/usr/lib"))
    );
}

#[test]
fn main_hooks_set_search_path_when_unset() {
    let hooks = MainModuleHooks::new(MemoryEnvironment::default());
    hooks.on_before_launch(Path::new("/opt/tether/1.2.3"));
    assert_eq!(
        hooks_environment(&hooks).var(LIBRARY_SEARCH_VAR),
        Some(OsString::from("/opt/tether/1.2.3"))
    );
}

#[test]
fn main_hooks_map_unknown_results_to_error() {
    let entry: IntegerEntry = returns_garbage;
    let loader = DynamicModuleLoader::with_libraries(
        ModuleKind::Main,
        MainModuleHooks::new(MemoryEnvironment::default()),
        FakeLibraries::new(FakeModule::Integer(entry), Journal::default()),
    );
    assert_eq!(loader.launch(&module_path()), ResultCode::ErrorOccurred.code());
}

fn hooks_environment(hooks: &MainModuleHooks<MemoryEnvironment>) -> &MemoryEnvironment {
    hooks.environment()
}

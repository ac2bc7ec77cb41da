//! Doubles shared by the tether tests.

mod libraries;
mod journaling;

use std::ffi::{OsStr, OsString, c_int};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use mockall::mock;
use tempfile::TempDir;
use tether_config::{AppDirectories, Config, RuntimePaths, Switches};
use tether_module_api::ModuleKind;

use crate::bootstrap::ModuleLauncher;
use crate::crash::{CrashArtifacts, CrashNotifier};
use crate::loader::ProcessEnvironment;
use crate::single_instance::InstanceObserver;
use crate::{AppContext, AppPaths, ProcessSpawner, SpawnError};

pub(crate) use libraries::{FakeLibraries, FakeModule, queue_secret_module};
pub(crate) use journaling::JournalingModule;

/// Version used for every test layout.
pub(crate) const TEST_VERSION: &str = "1.2.3";

mock! {
    pub Spawner {}
    impl ProcessSpawner for Spawner {
        fn spawn(&self, program: &Path, args: &[OsString]) -> Result<u32, SpawnError>;
    }
}

mock! {
    pub Launcher {}
    impl ModuleLauncher for Launcher {
        fn launch(&self, kind: ModuleKind, path: &Path) -> c_int;
    }
}

mock! {
    pub Notifier {}
    impl CrashNotifier for Notifier {
        fn confirm_restart(&self, artifacts: &CrashArtifacts) -> bool;
    }
}

/// Ordered record of lifecycle events, shared between doubles.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn record(&self, event: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.to_owned());
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|recorded| recorded == event)
    }
}

/// A temporary install: executable, data directory and runtime directory.
pub(crate) struct TestLayout {
    temp: TempDir,
}

impl TestLayout {
    pub(crate) fn new() -> Self {
        let temp = tempfile::tempdir().expect("temp dir");
        std::fs::create_dir_all(temp.path().join("run")).expect("runtime dir");
        Self { temp }
    }

    pub(crate) fn root(&self) -> &Path {
        self.temp.path()
    }

    pub(crate) fn exe_path(&self) -> PathBuf {
        self.root().join("tether")
    }

    pub(crate) fn runtime(&self) -> RuntimePaths {
        RuntimePaths::new(self.root().join("run"))
    }

    pub(crate) fn directories(&self) -> AppDirectories {
        AppDirectories::under(&self.root().join("data"))
    }

    pub(crate) fn context(&self, args: &[&str]) -> AppContext {
        let argv = std::iter::once("tether").chain(args.iter().copied());
        let switches = Switches::parse_from_args(argv).expect("switches parse");
        let paths = AppPaths::derive(self.exe_path(), TEST_VERSION).expect("layout");
        AppContext::from_parts(
            paths,
            switches,
            Config::default(),
            self.directories(),
            self.runtime(),
        )
    }
}

/// Forwards instance messages into channels the test can wait on.
#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    pub(crate) activations: Mutex<usize>,
    pub(crate) command_lines: Mutex<Vec<Vec<String>>>,
}

impl RecordingObserver {
    pub(crate) fn activation_count(&self) -> usize {
        *self
            .activations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn received_command_lines(&self) -> Vec<Vec<String>> {
        self.command_lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl InstanceObserver for RecordingObserver {
    fn activated(&self) {
        *self
            .activations
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn command_line_received(&self, args: Vec<String>) {
        self.command_lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(args);
    }
}

/// Polls `condition` for up to two seconds.
pub(crate) fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    condition()
}

/// Process environment held in memory.
#[derive(Debug, Default)]
pub(crate) struct MemoryEnvironment {
    pub(crate) current_dir: Mutex<Option<PathBuf>>,
    pub(crate) vars: Mutex<Vec<(String, OsString)>>,
}

impl MemoryEnvironment {
    pub(crate) fn with_var(key: &str, value: &str) -> Self {
        let environment = Self::default();
        environment.set_var(key, OsStr::new(value));
        environment
    }

    pub(crate) fn var(&self, key: &str) -> Option<OsString> {
        self.var_os(key)
    }
}

impl ProcessEnvironment for MemoryEnvironment {
    fn set_current_dir(&self, dir: &Path) -> io::Result<()> {
        *self
            .current_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(dir.to_path_buf());
        Ok(())
    }

    fn var_os(&self, key: &str) -> Option<OsString> {
        self.vars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    }

    fn set_var(&self, key: &str, value: &OsStr) {
        self.vars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.to_owned(), value.to_os_string()));
    }
}

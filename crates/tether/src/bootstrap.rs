//! Process role selection and the launcher's bootstrap sequence.
//!
//! A watcher-role process only delegates to the watcher module. A launcher
//! arbitrates single-instance ownership, spawns its watcher in release
//! builds, then runs the main module until it returns.

use std::ffi::{OsString, c_int};
use std::path::Path;

use tether_config::{APP_TYPE_SWITCH, APP_WATCHER_VALUE, PARENT_PID_SWITCH, Switches};
use tether_module_api::{LOAD_FAILURE, ModuleKind, ResultCode};
use tracing::{info, warn};

use crate::context::AppContext;
use crate::loader::{DynamicModuleLoader, MainModuleHooks, NoopHooks, SystemEnvironment};
use crate::single_instance::{
    InstanceObserver, LoggingInstanceObserver, Ownership, SingleInstanceGuard,
};
use crate::spawn::{ProcessSpawner, SpawnError, SystemProcessSpawner};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Role of the current process, fixed at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// The user-facing launcher that hosts the main module.
    MainLauncher,
    /// The crash watcher spawned by a launcher.
    Watcher,
}

impl ProcessRole {
    /// Reads the role from the `app-type` switch.
    #[must_use]
    pub fn from_switches(switches: &Switches) -> Self {
        if switches.is_watcher() {
            Self::Watcher
        } else {
            Self::MainLauncher
        }
    }
}

/// Command-line arguments for a watcher supervising `parent_pid`.
#[must_use]
pub fn watcher_arguments(parent_pid: u32) -> Vec<OsString> {
    vec![
        Switches::format_switch(APP_TYPE_SWITCH, APP_WATCHER_VALUE),
        Switches::format_switch(PARENT_PID_SWITCH, parent_pid),
    ]
}

/// Launches the watcher process for this launcher.
#[derive(Debug)]
pub struct WatcherSpawner<'a, S> {
    spawner: &'a S,
    exe_path: &'a Path,
}

impl<'a, S: ProcessSpawner> WatcherSpawner<'a, S> {
    /// Builds a spawner relaunching `exe_path` in the watcher role.
    #[must_use]
    pub const fn new(spawner: &'a S, exe_path: &'a Path) -> Self {
        Self { spawner, exe_path }
    }

    /// Starts the watcher for `parent_pid`, returning its pid.
    ///
    /// # Errors
    ///
    /// Returns the [`SpawnError`] from the underlying spawner.
    pub fn spawn(&self, parent_pid: u32) -> Result<u32, SpawnError> {
        self.spawner
            .spawn(self.exe_path, &watcher_arguments(parent_pid))
    }
}

/// Runs a module to completion.
pub trait ModuleLauncher {
    /// Loads the module of `kind` at `path` and returns its result, or
    /// [`LOAD_FAILURE`].
    fn launch(&self, kind: ModuleKind, path: &Path) -> c_int;
}

/// Launcher backed by [`DynamicModuleLoader`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemModuleLauncher;

impl ModuleLauncher for SystemModuleLauncher {
    fn launch(&self, kind: ModuleKind, path: &Path) -> c_int {
        match kind {
            ModuleKind::Main => {
                DynamicModuleLoader::new(kind, MainModuleHooks::new(SystemEnvironment)).launch(path)
            }
            ModuleKind::Watcher | ModuleKind::Secret => {
                DynamicModuleLoader::new(kind, NoopHooks).launch(path)
            }
        }
    }
}

/// Collaborators used by [`run_bootstrap_with`].
#[derive(Debug)]
pub struct BootstrapPlan<S, M, O> {
    /// Spawns the watcher and restarts.
    pub spawner: S,
    /// Runs modules.
    pub modules: M,
    /// Receives single-instance messages while the main module runs.
    pub observer: O,
    /// Whether to spawn a watcher. Off in debug builds.
    pub spawn_watcher: bool,
}

impl BootstrapPlan<SystemProcessSpawner, SystemModuleLauncher, LoggingInstanceObserver> {
    /// Production collaborators.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            spawner: SystemProcessSpawner,
            modules: SystemModuleLauncher,
            observer: LoggingInstanceObserver,
            spawn_watcher: !cfg!(debug_assertions),
        }
    }
}

/// Runs the bootstrap with production collaborators.
#[must_use]
pub fn run_bootstrap(context: &AppContext) -> c_int {
    run_bootstrap_with(context, BootstrapPlan::system())
}

/// Runs the bootstrap and returns the process exit code.
pub fn run_bootstrap_with<S, M, O>(context: &AppContext, plan: BootstrapPlan<S, M, O>) -> c_int
where
    S: ProcessSpawner,
    M: ModuleLauncher,
    O: InstanceObserver + 'static,
{
    let role = ProcessRole::from_switches(context.switches());
    info!(target: BOOTSTRAP_TARGET, role = ?role, "process role resolved");
    match role {
        ProcessRole::Watcher => {
            let path = context.paths().module_path(ModuleKind::Watcher);
            exit_code(plan.modules.launch(ModuleKind::Watcher, &path)).code()
        }
        ProcessRole::MainLauncher => run_launcher(context, plan),
    }
}

fn run_launcher<S, M, O>(context: &AppContext, plan: BootstrapPlan<S, M, O>) -> c_int
where
    S: ProcessSpawner,
    M: ModuleLauncher,
    O: InstanceObserver + 'static,
{
    let BootstrapPlan {
        spawner,
        modules,
        observer,
        spawn_watcher,
    } = plan;
    let switches = context.switches();
    if switches.crash_restart {
        info!(target: BOOTSTRAP_TARGET, "relaunched after a crash");
    }

    // Ownership is settled before the watcher exists, so a second launcher
    // never leaves an orphaned watcher behind.
    let mut guard = SingleInstanceGuard::new(context.runtime().clone());
    match guard.install(observer) {
        Ok(Ownership::Owner) => {}
        Ok(Ownership::NotOwner) => {
            hand_off_command_line(&guard, &switches.forwarded);
            return ResultCode::NormalExit.code();
        }
        Err(error) => {
            warn!(
                target: BOOTSTRAP_TARGET,
                error = %error,
                "single-instance check failed; continuing"
            );
        }
    }

    if spawn_watcher {
        let watcher = WatcherSpawner::new(&spawner, context.paths().exe_path());
        match watcher.spawn(std::process::id()) {
            Ok(pid) => info!(target: BOOTSTRAP_TARGET, pid, "watcher spawned"),
            Err(error) => warn!(
                target: BOOTSTRAP_TARGET,
                error = %error,
                "watcher unavailable; running without crash supervision"
            ),
        }
    }

    let main_path = context.paths().module_path(ModuleKind::Main);
    let result = exit_code(modules.launch(ModuleKind::Main, &main_path));
    guard.uninstall();

    if result == ResultCode::RestartApp {
        restart(&spawner, context);
    }
    result.code()
}

fn hand_off_command_line(guard: &SingleInstanceGuard, forwarded: &[String]) {
    if forwarded.is_empty() {
        return;
    }
    if let Err(error) = guard.transmit_command_line(forwarded) {
        warn!(
            target: BOOTSTRAP_TARGET,
            error = %error,
            "failed to forward command line to the running instance"
        );
    }
}

fn restart<S: ProcessSpawner>(spawner: &S, context: &AppContext) {
    let args: Vec<OsString> = context
        .switches()
        .forwarded
        .iter()
        .map(OsString::from)
        .collect();
    match spawner.spawn(context.paths().exe_path(), &args) {
        Ok(pid) => info!(target: BOOTSTRAP_TARGET, pid, "application restarted"),
        Err(error) => warn!(
            target: BOOTSTRAP_TARGET,
            error = %error,
            "restart requested but relaunch failed"
        ),
    }
}

/// Maps a module's raw result to the process result.
#[must_use]
pub fn exit_code(raw: c_int) -> ResultCode {
    if raw == LOAD_FAILURE {
        return ResultCode::ErrorOccurred;
    }
    ResultCode::from_code(raw).unwrap_or(ResultCode::ErrorOccurred)
}

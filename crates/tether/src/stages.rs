//! Stage runners exported by the main and watcher modules.
//!
//! Each module is a separate shared object with its own copy of this crate,
//! so a stage rebuilds its context and telemetry from the process it runs in.

use std::sync::Arc;

use tether_config::{Config, MAX_CRASH_LOG_BYTES, Switches};
use tether_module_api::{ModuleKind, ResultCode};
use tracing::{error, info, warn};

use crate::context::{APP_VERSION, AppContext};
use crate::crash::{
    CrashLog, CrashServer, CrashServerPaths, CrashSettings, CrashSupervisor, ServeOutcome,
    TerminalNotifier,
};
use crate::log_file::LogFile;
use crate::runtime::{DEFAULT_POOL_THREADS, HostRuntime};
use crate::secret::{SecretModuleBridge, load_or_continue};
use crate::shutdown::ShutdownWatch;
use crate::spawn::SystemProcessSpawner;
use crate::telemetry::{self, LogSink};

const STAGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::stage");

fn stage_context() -> Result<AppContext, ResultCode> {
    let switches = Switches::parse_from_args(std::env::args_os()).unwrap_or_default();
    let config = Config::load_layers().unwrap_or_default();
    AppContext::resolve(switches, config).map_err(|error| {
        drop(telemetry::initialise(
            tether_config::DEFAULT_LOG_FILTER,
            tether_config::LogFormat::default(),
            &LogSink::Stderr,
        ));
        error!(
            target: STAGE_TARGET,
            error = %error,
            "failed to resolve application context"
        );
        ResultCode::ErrorOccurred
    })
}

/// Body of `AppMainEntry`.
#[must_use]
pub fn run_main_stage() -> ResultCode {
    match stage_context() {
        Ok(context) => run_main(&context),
        Err(code) => code,
    }
}

/// Runs the main stage for `context` until a termination signal arrives.
#[must_use]
pub fn run_main(context: &AppContext) -> ResultCode {
    let log = match open_module_log(context) {
        Ok(log) => log,
        Err(code) => return code,
    };
    info!(
        target: STAGE_TARGET,
        version = APP_VERSION,
        module_dir = %context.paths().main_module_dir().display(),
        "main module starting"
    );
    install_crash_supervisor(context, log.as_ref());

    let runtime = match HostRuntime::new(DEFAULT_POOL_THREADS) {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(
                target: STAGE_TARGET,
                error = %error,
                "host runtime failed to start"
            );
            return ResultCode::ErrorOccurred;
        }
    };
    let code = run_host(context, &runtime);
    runtime.shutdown();
    info!(target: STAGE_TARGET, "main module exiting");
    if let Some(log) = log
        && let Err(error) = log.flush()
    {
        warn!(target: STAGE_TARGET, error = %error, "failed to flush log");
    }
    code
}

fn open_module_log(context: &AppContext) -> Result<Option<Arc<LogFile>>, ResultCode> {
    let directories = context.directories();
    if let Err(error) = directories.prepare() {
        drop(telemetry::initialise_launcher(
            context.config(),
            context.switches(),
        ));
        error!(
            target: STAGE_TARGET,
            error = %error,
            "user data directory unavailable"
        );
        return Err(ResultCode::MissingData);
    }
    match telemetry::initialise_module(context.config(), context.switches(), directories) {
        Ok(log) => Ok(Some(log)),
        Err(error) => {
            drop(telemetry::initialise_launcher(
                context.config(),
                context.switches(),
            ));
            warn!(
                target: STAGE_TARGET,
                error = %error,
                "application log unavailable; logging to stderr"
            );
            Ok(None)
        }
    }
}

fn install_crash_supervisor(context: &AppContext, log: Option<&Arc<LogFile>>) {
    let settings = CrashSettings {
        crash_dir: context.directories().crash_dir().to_path_buf(),
        version: APP_VERSION.to_owned(),
        full_memory: context.switches().full_minidump,
        max_log_bytes: MAX_CRASH_LOG_BYTES,
    };
    let crash_log = log.map(|log| Arc::clone(log) as Arc<dyn CrashLog>);
    let runtime = context.runtime();
    if let Err(error) = CrashSupervisor::install(
        runtime.crash_socket(),
        runtime.crash_ready(),
        &settings,
        crash_log,
    ) {
        warn!(
            target: STAGE_TARGET,
            error = %error,
            "crash capture unavailable"
        );
    }
}

fn run_host(context: &AppContext, runtime: &HostRuntime) -> ResultCode {
    let secret = load_or_continue(
        &SecretModuleBridge::new(),
        runtime,
        &context.paths().module_path(ModuleKind::Secret),
        context.directories().global_profile_dir(),
    );
    match ShutdownWatch::start(runtime.main_loop().quit_handle()) {
        Ok(watch) => {
            runtime.main_loop().run();
            watch.stop();
        }
        Err(error) => {
            warn!(
                target: STAGE_TARGET,
                error = %error,
                "cannot wait for termination signals; exiting"
            );
        }
    }
    // The secret module lets go of the runners before they stop.
    drop(secret);
    ResultCode::NormalExit
}

/// Body of `AppModuleEntry` in the watcher module.
#[must_use]
pub fn run_watcher_stage() -> ResultCode {
    match stage_context() {
        Ok(context) => run_watcher(&context),
        Err(code) => code,
    }
}

/// Serves crash reports for the parent process.
#[must_use]
pub fn run_watcher(context: &AppContext) -> ResultCode {
    drop(telemetry::initialise(
        context.config().log_filter_for(context.switches()),
        context.config().log_format(),
        &LogSink::Stderr,
    ));
    info!(
        target: STAGE_TARGET,
        parent_pid = ?context.switches().parent_pid,
        "watcher starting"
    );
    let runtime = context.runtime();
    let paths = CrashServerPaths {
        socket: runtime.crash_socket().to_path_buf(),
        ready: runtime.crash_ready().to_path_buf(),
        exe_path: context.paths().exe_path().to_path_buf(),
    };
    let outcome = CrashServer::bind(paths, TerminalNotifier, SystemProcessSpawner)
        .and_then(CrashServer::serve);
    match outcome {
        Ok(ServeOutcome::Crashed { restarted, .. }) => {
            info!(target: STAGE_TARGET, restarted, "watcher finished after crash");
            ResultCode::NormalExit
        }
        Ok(ServeOutcome::ClientExited { .. } | ServeOutcome::NoClient) => ResultCode::NormalExit,
        Err(error) => {
            error!(
                target: STAGE_TARGET,
                error = %error,
                "crash server failed"
            );
            ResultCode::ErrorOccurred
        }
    }
}

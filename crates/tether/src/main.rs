//! The tether launcher.

use std::process::ExitCode;

use tether::{AppContext, run_bootstrap, telemetry};
use tether_config::{Config, Switches};
use tether_module_api::ResultCode;
use tracing::{error, warn};

fn main() -> ExitCode {
    let (switches, switch_error) = match Switches::parse_from_args(std::env::args_os()) {
        Ok(switches) => (switches, None),
        Err(error) => (Switches::default(), Some(error)),
    };
    let (config, config_error) = match Config::load_layers() {
        Ok(config) => (config, None),
        Err(error) => (Config::default(), Some(error)),
    };
    // Without telemetry there is nowhere to report the failure.
    drop(telemetry::initialise_launcher(&config, &switches));
    if let Some(error) = switch_error {
        warn!(error = %error, "ignoring unparseable switches");
    }
    if let Some(error) = config_error {
        warn!(error = %error, "configuration unavailable; using defaults");
    }

    let context = match AppContext::resolve(switches, config) {
        Ok(context) => context,
        Err(error) => {
            error!(error = %error, "failed to resolve application context");
            return to_exit_code(ResultCode::ErrorOccurred.code());
        }
    };
    to_exit_code(run_bootstrap(&context))
}

fn to_exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

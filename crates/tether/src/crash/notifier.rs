//! Asking the user whether to restart after a crash.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use tracing::info;

use super::CRASH_TARGET;
use super::server::CrashArtifacts;

/// Decides whether the crashed application is relaunched.
pub trait CrashNotifier: Send + Sync {
    /// Presents the crash and returns `true` only on explicit confirmation.
    fn confirm_restart(&self, artifacts: &CrashArtifacts) -> bool;
}

const TERMINAL: &str = "/dev/tty";

/// Prompts on the controlling terminal. Declines when there is none.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl CrashNotifier for TerminalNotifier {
    fn confirm_restart(&self, artifacts: &CrashArtifacts) -> bool {
        let Ok(mut terminal) = OpenOptions::new().read(true).write(true).open(Path::new(TERMINAL))
        else {
            info!(
                target: CRASH_TARGET,
                dump = %artifacts.dump.display(),
                "no terminal to confirm restart; leaving the application closed"
            );
            return false;
        };
        let prompt = format!(
            "tether stopped unexpectedly (report {}). Restart? [y/N] ",
            artifacts.dump_id
        );
        if terminal
            .write_all(prompt.as_bytes())
            .and_then(|()| terminal.flush())
            .is_err()
        {
            return false;
        }
        let mut answer = String::new();
        if BufReader::new(terminal).read_line(&mut answer).is_err() {
            return false;
        }
        is_confirmation(&answer)
    }
}

fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y" | "yes" | "Yes" | "YES")
}

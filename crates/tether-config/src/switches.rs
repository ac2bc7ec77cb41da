//! Command-line switches understood by every tether process.
//!
//! Switches use long `--name[=value]` syntax. Tokens that follow the first
//! positional argument are kept verbatim as forwarded arguments so a second
//! instance can hand them to the owner.

use std::ffi::OsString;

use clap::Parser;

/// Selects the process role; `app-watcher` means watcher.
pub const APP_TYPE_SWITCH: &str = "app-type";
/// Value of [`APP_TYPE_SWITCH`] selecting the watcher role.
pub const APP_WATCHER_VALUE: &str = "app-watcher";
/// Pid of the process a watcher supervises.
pub const PARENT_PID_SWITCH: &str = "parent-pid";
/// Requests full-memory crash capture.
pub const FULL_MINIDUMP_SWITCH: &str = "full-minidump";
/// Enables verbose logging mirrored to the console.
pub const DEBUG_CONSOLE_SWITCH: &str = "debug-console";
/// Marks a relaunch that came from the crash notification flow.
pub const CRASH_RESTART_SWITCH: &str = "crash-restart";

/// Parsed process switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "tether", disable_help_flag = true, disable_version_flag = true)]
pub struct Switches {
    /// Process role selector.
    #[arg(long = APP_TYPE_SWITCH, value_name = "TYPE")]
    pub app_type: Option<String>,
    /// Pid of the supervised main process.
    #[arg(long = PARENT_PID_SWITCH, value_name = "PID")]
    pub parent_pid: Option<u32>,
    /// Capture full process memory in crash reports.
    #[arg(long = FULL_MINIDUMP_SWITCH)]
    pub full_minidump: bool,
    /// Mirror verbose logs to the console.
    #[arg(long = DEBUG_CONSOLE_SWITCH)]
    pub debug_console: bool,
    /// Launch originates from a crash restart prompt.
    #[arg(long = CRASH_RESTART_SWITCH)]
    pub crash_restart: bool,
    /// Remaining arguments, forwarded untouched.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub forwarded: Vec<String>,
}

impl Switches {
    /// Parses switches from a full argument vector including the program name.
    ///
    /// # Errors
    ///
    /// Returns the `clap` error when a known switch carries an invalid value or
    /// an unknown switch precedes the forwarded arguments.
    pub fn parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    /// Returns `true` when the switches select the watcher role.
    #[must_use]
    pub fn is_watcher(&self) -> bool {
        self.app_type.as_deref() == Some(APP_WATCHER_VALUE)
    }

    /// Formats `--name=value`.
    #[must_use]
    pub fn format_switch(name: &str, value: impl std::fmt::Display) -> OsString {
        OsString::from(format!("--{name}={value}"))
    }

    /// Formats a bare `--name` flag.
    #[must_use]
    pub fn format_flag(name: &str) -> OsString {
        OsString::from(format!("--{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_command_line_selects_defaults() {
        let switches = Switches::parse_from_args(["tether"]).expect("parse");
        assert_eq!(switches, Switches::default());
        assert!(!switches.is_watcher());
    }

    #[rstest]
    #[case(&["tether", "--app-type=app-watcher", "--parent-pid=42"])]
    #[case(&["tether", "--app-type", "app-watcher", "--parent-pid", "42"])]
    fn watcher_switches_parse_in_both_forms(#[case] args: &[&str]) {
        let switches = Switches::parse_from_args(args.iter().copied()).expect("parse");
        assert!(switches.is_watcher());
        assert_eq!(switches.parent_pid, Some(42));
    }

    #[test]
    fn other_app_type_is_not_watcher() {
        let switches =
            Switches::parse_from_args(["tether", "--app-type=renderer"]).expect("parse");
        assert!(!switches.is_watcher());
    }

    #[test]
    fn forwarded_arguments_are_kept_verbatim() {
        let switches = Switches::parse_from_args([
            "tether",
            "--debug-console",
            "open",
            "--flag",
            "file.txt",
        ])
        .expect("parse");
        assert!(switches.debug_console);
        assert_eq!(switches.forwarded, vec!["open", "--flag", "file.txt"]);
    }

    #[test]
    fn invalid_parent_pid_is_rejected() {
        let result = Switches::parse_from_args(["tether", "--parent-pid=abc"]);
        assert!(result.is_err());
    }

    #[test]
    fn formats_switches() {
        assert_eq!(
            Switches::format_switch(PARENT_PID_SWITCH, 7),
            OsString::from("--parent-pid=7")
        );
        assert_eq!(
            Switches::format_flag(CRASH_RESTART_SWITCH),
            OsString::from("--crash-restart")
        );
    }
}

//! Log output formats and the on-disk layout of the application log.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Line format used by every tether process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record. Crash log snapshots stay machine-readable.
    #[default]
    Json,
    /// Terse text for interactive runs with `--debug-console`.
    Compact,
}

/// Error returned when `TETHER_LOG_FORMAT` names no known format.
pub type LogFormatParseError = strum::ParseError;

/// Marker line written between runs in the application log.
pub const LOG_BOUNDARY: &str = "----------app.log.boundary";

/// File name of the application log inside the user data directory.
pub const LOG_FILE_NAME: &str = "app.log";

/// Largest log tail, in bytes, captured alongside a crash report.
pub const MAX_CRASH_LOG_BYTES: u64 = 5 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("COMPACT", LogFormat::Compact)]
    fn formats_parse_case_insensitively(#[case] text: &str, #[case] expected: LogFormat) {
        assert_eq!(text.parse::<LogFormat>().expect("known format"), expected);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}

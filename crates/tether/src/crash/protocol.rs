//! Messages sent from a crash client to the watcher's crash server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One JSON line on the crash-handler socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sent once when the client installs its handler.
    Hello {
        /// Client process id.
        pid: u32,
    },
    /// Sent from the crash handler after the dump attempt.
    Crashed {
        /// Client process id.
        pid: u32,
        /// Dump file the handler wrote.
        dump: PathBuf,
    },
}

impl ClientMessage {
    /// Encodes the message as a newline-terminated JSON line.
    pub(crate) fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crashed_line_is_tagged() {
        let line = ClientMessage::Crashed {
            pid: 7,
            dump: PathBuf::from("/tmp/a.dmp"),
        }
        .to_line()
        .expect("encode");
        let text = String::from_utf8(line).expect("utf8");
        assert_eq!(text, "{\"type\":\"crashed\",\"pid\":7,\"dump\":\"/tmp/a.dmp\"}\n");
    }
}

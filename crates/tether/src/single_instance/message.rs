use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Messages an instance sends to the owner.
///
/// The serialised names are fixed and versioned so that every build of the
/// application agrees on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceMessage {
    /// Bring the owner's UI to the foreground.
    #[serde(rename = "tether.instance.activate.v1")]
    Activate,
    /// Read the hand-off file and handle its command line.
    #[serde(rename = "tether.instance.command-line.v1")]
    TransmitCommandLine,
}

/// Wire form of a message: one JSON object per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub(crate) message: InstanceMessage,
    /// Sender clock in milliseconds since the Unix epoch.
    pub(crate) sent_at_ms: u64,
}

impl Envelope {
    pub(crate) fn now(message: InstanceMessage) -> Self {
        Self {
            message,
            sent_at_ms: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

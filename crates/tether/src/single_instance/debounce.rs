use std::collections::HashMap;
use std::time::Duration;

use super::InstanceMessage;

/// Refractory window applied per message.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Suppresses repeats of a message that arrive within the window of the last
/// acted-upon occurrence.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window_ms: u64,
    last_acted: HashMap<InstanceMessage, u64>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

impl Debouncer {
    /// Builds a debouncer with `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            last_acted: HashMap::new(),
        }
    }

    /// Returns `true` when `message`, stamped `at_ms`, should be acted upon.
    pub fn should_act(&mut self, message: InstanceMessage, at_ms: u64) -> bool {
        if let Some(previous) = self.last_acted.get(&message)
            && previous.abs_diff(at_ms) < self.window_ms
        {
            return false;
        }
        self.last_acted.insert(message, at_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 999, false)]
    #[case(0, 1000, true)]
    #[case(500, 2100, true)]
    #[case(1000, 1000, false)]
    fn repeats_inside_the_window_are_ignored(
        #[case] first: u64,
        #[case] second: u64,
        #[case] acted: bool,
    ) {
        let mut debouncer = Debouncer::default();
        assert!(debouncer.should_act(InstanceMessage::Activate, first));
        assert_eq!(
            debouncer.should_act(InstanceMessage::Activate, second),
            acted
        );
    }

    #[test]
    fn messages_are_debounced_independently() {
        let mut debouncer = Debouncer::default();
        assert!(debouncer.should_act(InstanceMessage::Activate, 10));
        assert!(debouncer.should_act(InstanceMessage::TransmitCommandLine, 20));
    }

    #[test]
    fn ignored_repeat_does_not_extend_the_window() {
        let mut debouncer = Debouncer::default();
        assert!(debouncer.should_act(InstanceMessage::Activate, 0));
        assert!(!debouncer.should_act(InstanceMessage::Activate, 900));
        assert!(debouncer.should_act(InstanceMessage::Activate, 1000));
    }
}

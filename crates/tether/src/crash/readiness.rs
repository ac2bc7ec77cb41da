//! Readiness signal between the watcher and its client.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// How long a client waits for the watcher to report readiness.
pub const READY_TIMEOUT: Duration = Duration::from_millis(250);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Waits up to `timeout` for the readiness file at `path` to appear.
#[must_use]
pub fn wait_for_ready(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if path.exists() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn absent_signal_times_out() {
        let temp = tempfile::tempdir().expect("temp dir");
        let started = Instant::now();
        assert!(!wait_for_ready(&temp.path().join("ready"), READY_TIMEOUT));
        assert!(started.elapsed() >= READY_TIMEOUT);
    }

    #[test]
    fn signal_raised_during_wait_is_seen() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("ready");
        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            fs::write(writer_path, b"").expect("signal ready");
        });
        assert!(wait_for_ready(&path, Duration::from_secs(2)));
        writer.join().expect("writer thread");
    }
}

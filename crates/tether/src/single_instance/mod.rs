//! Arbitrates at most one interactive instance per user session.
//!
//! The first process to take the instance lock becomes the owner and
//! listens for messages on the instance socket. Any later process observes
//! the held lock, sends `Activate`, optionally hands over its command line
//! and exits without loading the main module.

mod channel;
mod debounce;
mod errors;
mod lock;
mod message;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tether_config::RuntimePaths;
use tracing::{info, warn};

use crate::files::{atomic_write, remove_if_present};

use channel::{EnvelopeSink, InstanceListener, ListenerHandle, send_envelope};
use lock::{InstanceLock, LockAttempt};
use message::Envelope;

pub use debounce::{DEBOUNCE_WINDOW, Debouncer};
pub use errors::SingleInstanceError;
pub use message::InstanceMessage;

pub(crate) const INSTANCE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::instance");

/// Reacts to messages delivered to the owning instance.
///
/// Callbacks run on the listener thread.
pub trait InstanceObserver: Send + Sync {
    /// Another instance asked the owner to come to the foreground.
    fn activated(&self);

    /// Another instance forwarded its command line.
    fn command_line_received(&self, args: Vec<String>);
}

impl<T: InstanceObserver + ?Sized> InstanceObserver for Arc<T> {
    fn activated(&self) {
        (**self).activated();
    }

    fn command_line_received(&self, args: Vec<String>) {
        (**self).command_line_received(args);
    }
}

/// Observer that records deliveries in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInstanceObserver;

impl InstanceObserver for LoggingInstanceObserver {
    fn activated(&self) {
        info!(
            target: INSTANCE_TARGET,
            event = "activated",
            "activation requested by another instance"
        );
    }

    fn command_line_received(&self, args: Vec<String>) {
        info!(
            target: INSTANCE_TARGET,
            event = "command_line_received",
            ?args,
            "command line forwarded by another instance"
        );
    }
}

/// Result of [`SingleInstanceGuard::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// This process owns the session.
    Owner,
    /// Another process owns the session; this one must exit.
    NotOwner,
}

enum GuardState {
    Unattempted,
    Owner {
        lock: InstanceLock,
        listener: Option<ListenerHandle>,
    },
    NotOwner,
    Released,
}

/// Single-instance token and its message plumbing.
pub struct SingleInstanceGuard {
    paths: RuntimePaths,
    state: GuardState,
}

impl SingleInstanceGuard {
    /// Builds an unattempted guard over the runtime layout.
    #[must_use]
    pub const fn new(paths: RuntimePaths) -> Self {
        Self {
            paths,
            state: GuardState::Unattempted,
        }
    }

    /// Current ownership, if install has run.
    #[must_use]
    pub const fn ownership(&self) -> Option<Ownership> {
        match self.state {
            GuardState::Owner { .. } => Some(Ownership::Owner),
            GuardState::NotOwner => Some(Ownership::NotOwner),
            GuardState::Unattempted | GuardState::Released => None,
        }
    }

    /// Attempts to take ownership of the session.
    ///
    /// The owner starts monitoring the instance socket and forwards debounced
    /// messages to `observer`. A non-owner broadcasts `Activate` before
    /// returning. Repeated calls report the first outcome.
    ///
    /// # Errors
    ///
    /// Fails when the lock file cannot be opened or locked at all. Failing to
    /// start monitoring is logged and does not affect ownership.
    pub fn install<O>(&mut self, observer: O) -> Result<Ownership, SingleInstanceError>
    where
        O: InstanceObserver + 'static,
    {
        if let Some(ownership) = self.ownership() {
            return Ok(ownership);
        }
        match InstanceLock::acquire(self.paths.instance_lock())? {
            LockAttempt::Acquired(lock) => {
                let listener = self.start_monitoring(observer);
                self.state = GuardState::Owner { lock, listener };
                Ok(Ownership::Owner)
            }
            LockAttempt::Held(pid) => {
                info!(
                    target: INSTANCE_TARGET,
                    owner_pid = ?pid,
                    "another instance owns the session"
                );
                self.state = GuardState::NotOwner;
                if let Err(error) = self.broadcast(InstanceMessage::Activate) {
                    warn!(
                        target: INSTANCE_TARGET,
                        error = %error,
                        "failed to activate the owning instance"
                    );
                }
                Ok(Ownership::NotOwner)
            }
        }
    }

    fn start_monitoring<O>(&self, observer: O) -> Option<ListenerHandle>
    where
        O: InstanceObserver + 'static,
    {
        match InstanceListener::bind(self.paths.instance_socket()) {
            Ok(listener) => Some(listener.start(Dispatcher {
                observer,
                debouncer: Debouncer::default(),
                handoff: self.paths.command_line_handoff().to_path_buf(),
            })),
            Err(error) => {
                warn!(
                    target: INSTANCE_TARGET,
                    error = %error,
                    "instance messages will not be monitored"
                );
                None
            }
        }
    }

    /// Sends `message` to the owning instance.
    ///
    /// # Errors
    ///
    /// Fails when the owner's socket cannot be reached.
    pub fn broadcast(&self, message: InstanceMessage) -> Result<(), SingleInstanceError> {
        send_envelope(self.paths.instance_socket(), &Envelope::now(message))
    }

    /// Writes `args` to the hand-off file, then asks the owner to read it.
    ///
    /// # Errors
    ///
    /// Fails when the hand-off file cannot be written or the owner cannot be
    /// reached.
    pub fn transmit_command_line(&self, args: &[String]) -> Result<(), SingleInstanceError> {
        let path = self.paths.command_line_handoff();
        let payload = serde_json::to_vec(args)?;
        atomic_write(path, &payload).map_err(|source| SingleInstanceError::Handoff {
            path: path.to_path_buf(),
            source,
        })?;
        self.broadcast(InstanceMessage::TransmitCommandLine)
    }

    /// Stops monitoring and releases the lock. Idempotent.
    pub fn uninstall(&mut self) {
        let previous = std::mem::replace(&mut self.state, GuardState::Released);
        if let GuardState::Owner { lock, listener } = previous {
            if let Some(handle) = listener
                && let Err(error) = handle.stop()
            {
                warn!(
                    target: INSTANCE_TARGET,
                    error = %error,
                    "instance listener did not stop cleanly"
                );
            }
            drop(lock);
            info!(target: INSTANCE_TARGET, "instance ownership released");
        }
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        self.uninstall();
    }
}

struct Dispatcher<O> {
    observer: O,
    debouncer: Debouncer,
    handoff: PathBuf,
}

impl<O: InstanceObserver> Dispatcher<O> {
    fn read_handoff(&self) -> Result<Vec<String>, SingleInstanceError> {
        let bytes = fs::read(&self.handoff).map_err(|source| SingleInstanceError::Handoff {
            path: self.handoff.clone(),
            source,
        })?;
        let args = serde_json::from_slice(&bytes)?;
        remove_if_present(&self.handoff).map_err(|source| SingleInstanceError::Handoff {
            path: self.handoff.clone(),
            source,
        })?;
        Ok(args)
    }
}

impl<O: InstanceObserver + 'static> EnvelopeSink for Dispatcher<O> {
    fn deliver(&mut self, envelope: Envelope) {
        if !self
            .debouncer
            .should_act(envelope.message, envelope.sent_at_ms)
        {
            info!(
                target: INSTANCE_TARGET,
                message = ?envelope.message,
                "ignoring repeated instance message"
            );
            return;
        }
        match envelope.message {
            InstanceMessage::Activate => self.observer.activated(),
            InstanceMessage::TransmitCommandLine => match self.read_handoff() {
                Ok(args) => self.observer.command_line_received(args),
                Err(SingleInstanceError::Handoff { source, .. })
                    if source.kind() == io::ErrorKind::NotFound =>
                {
                    warn!(
                        target: INSTANCE_TARGET,
                        "command-line hand-off file missing"
                    );
                }
                Err(error) => {
                    warn!(
                        target: INSTANCE_TARGET,
                        error = %error,
                        "failed to read forwarded command line"
                    );
                }
            },
        }
    }
}

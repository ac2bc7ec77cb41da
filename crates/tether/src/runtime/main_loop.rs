use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{info, warn};

use super::{RUNTIME_TARGET, Task, TaskRunner};

enum MainEvent {
    Task(Task),
    Quit,
}

/// Queue drained by the thread that calls [`MainLoop::run`].
pub struct MainLoop {
    sender: Sender<MainEvent>,
    receiver: Mutex<Receiver<MainEvent>>,
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl MainLoop {
    /// Builds an idle loop.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Handle that ends [`MainLoop::run`] from any thread.
    #[must_use]
    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            sender: self.sender.clone(),
        }
    }

    /// Runs tasks on the calling thread until a quit is requested.
    pub fn run(&self) {
        info!(target: RUNTIME_TARGET, "main loop running");
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        while let Ok(event) = receiver.recv() {
            match event {
                MainEvent::Task(task) => {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        warn!(target: RUNTIME_TARGET, "main thread task panicked");
                    }
                }
                MainEvent::Quit => break,
            }
        }
        info!(target: RUNTIME_TARGET, "main loop stopped");
    }
}

impl TaskRunner for MainLoop {
    fn post_task(&self, task: Task) -> bool {
        self.sender.send(MainEvent::Task(task)).is_ok()
    }
}

/// Requests that a [`MainLoop`] stop after the tasks queued before it.
#[derive(Clone)]
pub struct QuitHandle {
    sender: Sender<MainEvent>,
}

impl QuitHandle {
    /// Posts the quit request.
    pub fn quit(&self) {
        if self.sender.send(MainEvent::Quit).is_err() {
            warn!(target: RUNTIME_TARGET, "main loop already gone");
        }
    }
}

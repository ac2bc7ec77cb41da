use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::errors::RuntimeError;
use super::{RUNTIME_TARGET, Task, TaskRunner};

struct Shared {
    receiver: Mutex<Receiver<Task>>,
    shutting_down: AtomicBool,
}

/// Fixed-size pool of worker threads fed from one queue.
///
/// Shutdown stops accepting work, drops queued tasks that have not started
/// and joins every worker.
pub struct ThreadPool {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Starts `threads` workers named after `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Spawn`] when a worker thread cannot start;
    /// workers already started are shut down again.
    pub fn new(name: &str, threads: usize) -> Result<Self, RuntimeError> {
        let (sender, receiver) = mpsc::channel();
        let pool = Self {
            name: name.to_owned(),
            sender: Mutex::new(Some(sender)),
            shared: Arc::new(Shared {
                receiver: Mutex::new(receiver),
                shutting_down: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::with_capacity(threads)),
        };
        for index in 0..threads.max(1) {
            let worker = pool.spawn_worker(index).map_err(|source| RuntimeError::Spawn {
                name: format!("{name}-{index}"),
                source,
            })?;
            pool.workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(worker);
        }
        Ok(pool)
    }

    fn spawn_worker(&self, index: usize) -> io::Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(format!("{}-{index}", self.name))
            .spawn(move || run_worker(&shared))
    }

    /// Name given to the pool's threads.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the pool. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            if worker.join().is_err() {
                warn!(
                    target: RUNTIME_TARGET,
                    pool = %self.name,
                    "worker thread panicked"
                );
            }
        }
        debug!(target: RUNTIME_TARGET, pool = %self.name, "pool shut down");
    }
}

impl TaskRunner for ThreadPool {
    fn post_task(&self, task: Task) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sender| sender.send(task).is_ok())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared) {
    loop {
        let next = shared
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(task) = next else {
            break;
        };
        if shared.shutting_down.load(Ordering::SeqCst) {
            drop(task);
            continue;
        }
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            warn!(target: RUNTIME_TARGET, "task panicked");
        }
    }
}

/// Runs tasks one at a time, in posting order, on a dedicated thread.
pub struct SequencedTaskRunner {
    pool: ThreadPool,
}

impl SequencedTaskRunner {
    /// Starts the runner's thread.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Spawn`] when the thread cannot start.
    pub fn new(name: &str) -> Result<Self, RuntimeError> {
        Ok(Self {
            pool: ThreadPool::new(name, 1)?,
        })
    }

    /// Stops the runner. Idempotent.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl TaskRunner for SequencedTaskRunner {
    fn post_task(&self, task: Task) -> bool {
        self.pool.post_task(task)
    }
}

//! Scheduling primitives owned by the main module and lent to the secret
//! module.
//!
//! Teardown order matters: the pool and runners stop first, dropping any
//! queued task, and only then are retired module libraries unloaded, so no
//! queued callback can outlive the code it points into.

mod errors;
mod main_loop;
mod pool;

use std::sync::{Mutex, PoisonError};

use tracing::info;

pub use errors::RuntimeError;
pub use main_loop::{MainLoop, QuitHandle};
pub use pool::{SequencedTaskRunner, ThreadPool};

pub(crate) const RUNTIME_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::runtime");

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Accepts tasks for later execution.
pub trait TaskRunner: Send + Sync {
    /// Queues `task`; returns `false` when the runner no longer accepts work.
    fn post_task(&self, task: Task) -> bool;
}

/// Default number of pool workers.
pub const DEFAULT_POOL_THREADS: usize = 4;

/// The host's thread pool, profile runner and main-thread loop.
pub struct HostRuntime {
    thread_pool: ThreadPool,
    profile_runner: SequencedTaskRunner,
    main_loop: MainLoop,
    retired: Mutex<Vec<Box<dyn Send>>>,
}

impl HostRuntime {
    /// Starts the pool and the profile runner.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Spawn`] when a thread cannot start.
    pub fn new(pool_threads: usize) -> Result<Self, RuntimeError> {
        Ok(Self {
            thread_pool: ThreadPool::new("tether-pool", pool_threads)?,
            profile_runner: SequencedTaskRunner::new("tether-profile")?,
            main_loop: MainLoop::new(),
            retired: Mutex::new(Vec::new()),
        })
    }

    /// Shared thread pool.
    #[must_use]
    pub const fn thread_pool(&self) -> &ThreadPool {
        &self.thread_pool
    }

    /// Sequenced runner for profile I/O.
    #[must_use]
    pub const fn profile_runner(&self) -> &SequencedTaskRunner {
        &self.profile_runner
    }

    /// Main-thread loop.
    #[must_use]
    pub const fn main_loop(&self) -> &MainLoop {
        &self.main_loop
    }

    /// Keeps `resource` alive until after the runners have shut down.
    ///
    /// Used for module libraries whose code may still be referenced by
    /// queued tasks.
    pub fn retire(&self, resource: Box<dyn Send>) {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resource);
    }

    /// Stops every runner, then releases retired resources.
    pub fn shutdown(self) {
        let Self {
            thread_pool,
            profile_runner,
            main_loop,
            retired,
        } = self;
        thread_pool.shutdown();
        profile_runner.shutdown();
        drop(main_loop);
        let resources = retired.into_inner().unwrap_or_else(PoisonError::into_inner);
        let count = resources.len();
        drop(resources);
        info!(
            target: RUNTIME_TARGET,
            released = count,
            "host runtime shut down"
        );
    }
}

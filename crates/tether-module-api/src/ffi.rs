//! `repr(C)` tables exchanged across the module boundary.
//!
//! Both sides are built from this crate, but they are separate shared
//! objects with separate copies of every generic and allocator call. Every
//! heap object therefore travels with the function that frees it.

use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work owned by the side that created it.
///
/// Exactly one of `run` or `discard` is invoked, exactly once. Dropping a
/// `RawTask` without running it calls `discard`.
#[repr(C)]
pub struct RawTask {
    /// Opaque closure state.
    pub data: *mut c_void,
    /// Consumes `data` and performs the work.
    pub run: unsafe extern "C" fn(*mut c_void),
    /// Consumes `data` without performing the work.
    pub discard: unsafe extern "C" fn(*mut c_void),
}

// The closure captured by `from_closure` is `Send`; foreign constructors must
// uphold the same contract.
unsafe impl Send for RawTask {}

impl RawTask {
    /// Wraps a closure so that it can be handed to the other side.
    pub fn from_closure<F>(task: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let boxed: Box<BoxedTask> = Box::new(Box::new(task));
        Self {
            data: Box::into_raw(boxed).cast(),
            run: run_boxed_task,
            discard: discard_boxed_task,
        }
    }

    /// Runs the task, consuming it.
    pub fn run(self) {
        let task = ManuallyDrop::new(self);
        // SAFETY: `task` is never dropped, so `data` is consumed exactly once.
        unsafe { (task.run)(task.data) };
    }
}

impl Drop for RawTask {
    fn drop(&mut self) {
        let data = std::mem::replace(&mut self.data, ptr::null_mut());
        if !data.is_null() {
            // SAFETY: `data` came from the constructor paired with `discard`.
            unsafe { (self.discard)(data) };
        }
    }
}

unsafe extern "C" fn run_boxed_task(data: *mut c_void) {
    // SAFETY: produced by `RawTask::from_closure`.
    let task = unsafe { Box::from_raw(data.cast::<BoxedTask>()) };
    // A panic must not unwind into the other module.
    drop(catch_unwind(AssertUnwindSafe(move || task())));
}

unsafe extern "C" fn discard_boxed_task(data: *mut c_void) {
    // SAFETY: produced by `RawTask::from_closure`.
    drop(unsafe { Box::from_raw(data.cast::<BoxedTask>()) });
}

/// A task runner lent by the host.
///
/// `post` returns `false` once the host has revoked the runner; the task is
/// discarded in that case.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawTaskRunner {
    /// Host-owned runner state.
    pub context: *const c_void,
    /// Queues a task on the runner.
    pub post: unsafe extern "C" fn(*const c_void, RawTask) -> bool,
}

/// Capabilities lent to the secret module by `initialize`.
#[repr(C)]
#[derive(Debug)]
pub struct RawHostServices {
    /// UTF-8 profile directory path, not NUL-terminated.
    pub profile_dir: *const u8,
    /// Length of `profile_dir` in bytes.
    pub profile_dir_len: usize,
    /// Sequenced runner for profile I/O.
    pub profile_runner: RawTaskRunner,
    /// Runner executing on the host's main thread.
    pub main_runner: RawTaskRunner,
    /// Shared thread pool.
    pub thread_pool: RawTaskRunner,
}

/// Reference-counted secret module object returned by `AppSecretEntry`.
///
/// A null `instance` signals that the factory failed.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawSecretModule {
    /// Module-owned object.
    pub instance: *mut c_void,
    /// Adopts the host services; returns `false` on failure.
    pub initialize: Option<unsafe extern "C" fn(*mut c_void, *const RawHostServices) -> bool>,
    /// Releases every use of the host services and flushes state.
    pub uninitialize: Option<unsafe extern "C" fn(*mut c_void)>,
    /// Adds a reference to `instance`.
    pub add_ref: Option<unsafe extern "C" fn(*mut c_void)>,
    /// Drops a reference to `instance`.
    pub release: Option<unsafe extern "C" fn(*mut c_void)>,
}

impl RawSecretModule {
    /// The failure value.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            instance: ptr::null_mut(),
            initialize: None,
            uninitialize: None,
            add_ref: None,
            release: None,
        }
    }

    /// Whether the table is usable.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.instance.is_null()
            && self.initialize.is_some()
            && self.uninitialize.is_some()
            && self.add_ref.is_some()
            && self.release.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn run_executes_closure_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let task = RawTask::from_closure(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        task.run();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_unrun_task_releases_captures() {
        let drops = Arc::new(AtomicUsize::new(0));
        let guard = DropCounter(Arc::clone(&drops));
        let task = RawTask::from_closure(move || drop(guard));
        drop(task);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_task_does_not_unwind() {
        let task = RawTask::from_closure(|| panic!("task failure"));
        task.run();
    }

    #[test]
    fn null_module_is_incomplete() {
        assert!(!RawSecretModule::null().is_complete());
    }
}

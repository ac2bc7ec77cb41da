//! Module-side views of the capabilities lent by the host.

use std::path::PathBuf;

use crate::ffi::{RawHostServices, RawTask, RawTaskRunner};

/// A host task runner borrowed by a module.
///
/// The module never owns the runner: every `TaskRunner` must be dropped
/// before the module's `uninitialize` returns. Posting after the host has
/// revoked the runner fails and discards the task.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    raw: RawTaskRunner,
}

// The host guarantees that `post` may be called from any thread.
unsafe impl Send for TaskRunner {}
unsafe impl Sync for TaskRunner {}

impl TaskRunner {
    /// Wraps a raw runner.
    ///
    /// # Safety
    ///
    /// `raw.context` must stay valid for as long as the returned value (or
    /// any clone) is alive.
    #[must_use]
    pub const unsafe fn from_raw(raw: RawTaskRunner) -> Self {
        Self { raw }
    }

    /// Queues `task`; returns `false` when the runner no longer accepts work.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_raw(RawTask::from_closure(task))
    }

    /// Queues an already wrapped task.
    pub fn post_raw(&self, task: RawTask) -> bool {
        // SAFETY: `from_raw` requires the context to outlive `self`.
        unsafe { (self.raw.post)(self.raw.context, task) }
    }
}

/// Host capabilities handed to a secret module during `initialize`.
#[derive(Debug, Clone)]
pub struct HostServices {
    /// Profile directory owned by the host.
    pub profile_dir: PathBuf,
    /// Sequenced runner for profile I/O.
    pub profile_runner: TaskRunner,
    /// Runner on the host's main thread.
    pub main_runner: TaskRunner,
    /// Shared thread pool.
    pub thread_pool: TaskRunner,
}

impl HostServices {
    /// Copies the raw table into owned values.
    ///
    /// Returns `None` when the profile directory is not valid UTF-8.
    ///
    /// # Safety
    ///
    /// `raw.profile_dir` must point at `raw.profile_dir_len` readable bytes
    /// and every runner context must satisfy [`TaskRunner::from_raw`].
    #[must_use]
    pub unsafe fn from_raw(raw: &RawHostServices) -> Option<Self> {
        let bytes = if raw.profile_dir.is_null() {
            &[][..]
        } else {
            // SAFETY: guaranteed by the caller.
            unsafe { std::slice::from_raw_parts(raw.profile_dir, raw.profile_dir_len) }
        };
        let profile_dir = std::str::from_utf8(bytes).ok()?;
        // SAFETY: guaranteed by the caller.
        unsafe {
            Some(Self {
                profile_dir: PathBuf::from(profile_dir),
                profile_runner: TaskRunner::from_raw(raw.profile_runner),
                main_runner: TaskRunner::from_raw(raw.main_runner),
                thread_pool: TaskRunner::from_raw(raw.thread_pool),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::ptr;

    unsafe extern "C" fn run_inline(_context: *const c_void, task: RawTask) -> bool {
        task.run();
        true
    }

    unsafe extern "C" fn reject(_context: *const c_void, task: RawTask) -> bool {
        drop(task);
        false
    }

    const fn runner(post: unsafe extern "C" fn(*const c_void, RawTask) -> bool) -> RawTaskRunner {
        RawTaskRunner {
            context: ptr::null(),
            post,
        }
    }

    #[test]
    fn post_reaches_host_runner() {
        let runner = unsafe { TaskRunner::from_raw(runner(run_inline)) };
        let (sender, receiver) = std::sync::mpsc::channel();
        assert!(runner.post(move || sender.send(7).expect("send")));
        assert_eq!(receiver.recv().expect("task should run"), 7);
    }

    #[test]
    fn revoked_runner_reports_failure() {
        let runner = unsafe { TaskRunner::from_raw(runner(reject)) };
        assert!(!runner.post(|| {}));
    }

    #[test]
    fn host_services_copy_profile_dir() {
        let dir = "/profiles/Global";
        let raw = RawHostServices {
            profile_dir: dir.as_ptr(),
            profile_dir_len: dir.len(),
            profile_runner: runner(run_inline),
            main_runner: runner(run_inline),
            thread_pool: runner(run_inline),
        };
        let services = unsafe { HostServices::from_raw(&raw) }.expect("valid utf-8");
        assert_eq!(services.profile_dir, PathBuf::from(dir));
    }

    #[test]
    fn non_utf8_profile_dir_is_rejected() {
        let bytes = [0xff_u8, 0xfe];
        let raw = RawHostServices {
            profile_dir: bytes.as_ptr(),
            profile_dir_len: bytes.len(),
            profile_runner: runner(run_inline),
            main_runner: runner(run_inline),
            thread_pool: runner(run_inline),
        };
        assert!(unsafe { HostServices::from_raw(&raw) }.is_none());
    }
}

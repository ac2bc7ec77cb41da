//! Host runners lent across the module boundary.

use std::ffi::c_void;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use tether_module_api::{RawHostServices, RawTask, RawTaskRunner};

use crate::runtime::{HostRuntime, TaskRunner};

/// A runner the module may post to until the host revokes it.
pub(super) struct LentRunner<'rt> {
    target: &'rt dyn TaskRunner,
    revoked: AtomicBool,
}

impl<'rt> LentRunner<'rt> {
    fn new(target: &'rt dyn TaskRunner) -> Self {
        Self {
            target,
            revoked: AtomicBool::new(false),
        }
    }

    fn post(&self, task: RawTask) -> bool {
        if self.revoked.load(Ordering::SeqCst) {
            drop(task);
            return false;
        }
        self.target.post_task(Box::new(move || task.run()))
    }

    fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    fn as_raw(&self) -> RawTaskRunner {
        RawTaskRunner {
            context: ptr::from_ref(self).cast::<c_void>(),
            post: post_lent,
        }
    }
}

unsafe extern "C" fn post_lent(context: *const c_void, task: RawTask) -> bool {
    // SAFETY: `context` points at a `LentRunner` kept alive by the owning
    // `LentServices` for as long as the module may hold the table.
    let runner = unsafe { &*context.cast::<LentRunner<'_>>() };
    runner.post(task)
}

/// Everything handed to the module's `initialize`.
///
/// Boxed by the caller so the runner addresses stay stable.
pub(super) struct LentServices<'rt> {
    profile_dir: String,
    profile_runner: LentRunner<'rt>,
    main_runner: LentRunner<'rt>,
    thread_pool: LentRunner<'rt>,
}

impl<'rt> LentServices<'rt> {
    /// Returns `None` when `profile_dir` is not valid UTF-8.
    pub(super) fn new(runtime: &'rt HostRuntime, profile_dir: &Path) -> Option<Self> {
        Some(Self {
            profile_dir: profile_dir.to_str()?.to_owned(),
            profile_runner: LentRunner::new(runtime.profile_runner()),
            main_runner: LentRunner::new(runtime.main_loop()),
            thread_pool: LentRunner::new(runtime.thread_pool()),
        })
    }

    pub(super) fn as_raw(&self) -> RawHostServices {
        RawHostServices {
            profile_dir: self.profile_dir.as_ptr(),
            profile_dir_len: self.profile_dir.len(),
            profile_runner: self.profile_runner.as_raw(),
            main_runner: self.main_runner.as_raw(),
            thread_pool: self.thread_pool.as_raw(),
        }
    }

    pub(super) fn revoke(&self) {
        self.profile_runner.revoke();
        self.main_runner.revoke();
        self.thread_pool.revoke();
    }
}

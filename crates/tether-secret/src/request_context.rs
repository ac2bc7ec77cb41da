//! Request context scaffold scoped to the secret module's lifetime.

use std::path::{Path, PathBuf};

use tether_module_api::TaskRunner;

const CACHE_DIR: &str = "Cache";

/// Shared settings for network requests issued by the secret module.
///
/// Requests run on the host thread pool; the context owns no threads.
#[derive(Debug, Clone)]
pub struct RequestContext {
    user_agent: String,
    cache_dir: PathBuf,
    thread_pool: TaskRunner,
}

impl RequestContext {
    /// Builds the context for `profile_dir`.
    #[must_use]
    pub fn new(profile_dir: &Path, thread_pool: TaskRunner) -> Self {
        Self {
            user_agent: format!("tether/{}", env!("CARGO_PKG_VERSION")),
            cache_dir: profile_dir.join(CACHE_DIR),
            thread_pool,
        }
    }

    /// User agent sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// HTTP cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Runs `job` on the host thread pool.
    pub fn spawn<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.thread_pool.post(job)
    }
}

//! Root object of the secret module.

use std::sync::mpsc;

use tether::telemetry::{self, LogSink};
use tether_config::{DEFAULT_LOG_FILTER, LogFormat};
use tether_module_api::{HostServices, SecretModule, TaskRunner};
use tracing::{debug, info, warn};

use crate::SECRET_TARGET;
use crate::prefs::PreferenceStore;
use crate::request_context::RequestContext;

/// Everything the secret module builds on the host's services.
#[derive(Debug, Default)]
pub struct SecretServices {
    session: Option<Session>,
}

#[derive(Debug)]
struct Session {
    profile_runner: TaskRunner,
    main_runner: TaskRunner,
    prefs: PreferenceStore,
    requests: RequestContext,
}

impl SecretServices {
    /// Builds an uninitialised module.
    #[must_use]
    pub const fn new() -> Self {
        Self { session: None }
    }

    /// Preferences, available between `initialize` and `uninitialize`.
    #[must_use]
    pub fn preferences(&self) -> Option<&PreferenceStore> {
        self.session.as_ref().map(|session| &session.prefs)
    }

    /// Request context, available between `initialize` and `uninitialize`.
    #[must_use]
    pub fn request_context(&self) -> Option<&RequestContext> {
        self.session.as_ref().map(|session| &session.requests)
    }

    /// Runs `task` on the host main thread.
    pub fn post_to_main<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.session
            .as_ref()
            .is_some_and(|session| session.main_runner.post(task))
    }
}

impl SecretModule for SecretServices {
    fn initialize(&mut self, host: HostServices) -> bool {
        if self.session.is_some() {
            return false;
        }
        // This library carries its own tracing globals.
        drop(telemetry::initialise(
            DEFAULT_LOG_FILTER,
            LogFormat::Compact,
            &LogSink::Stderr,
        ));

        let prefs = PreferenceStore::in_profile(&host.profile_dir);
        if !prefs.load_async(&host.profile_runner) {
            warn!(target: SECRET_TARGET, "profile runner refused the preferences load");
            return false;
        }
        let requests = RequestContext::new(&host.profile_dir, host.thread_pool);
        self.session = Some(Session {
            profile_runner: host.profile_runner,
            main_runner: host.main_runner,
            prefs,
            requests,
        });
        info!(
            target: SECRET_TARGET,
            profile = %host.profile_dir.display(),
            "secret services initialised"
        );
        true
    }

    fn uninitialize(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let Session {
            profile_runner,
            main_runner,
            prefs,
            requests,
        } = session;
        drop(requests);
        drop(main_runner);
        commit_on(&profile_runner, &prefs);
        drop(profile_runner);
        debug!(target: SECRET_TARGET, "secret services released host runners");
    }
}

/// Commits on the profile runner so the write is ordered after the load.
/// Falls back to the calling thread when the runner drops the task.
fn commit_on(runner: &TaskRunner, prefs: &PreferenceStore) {
    let (done, finished) = mpsc::channel();
    let queued = prefs.clone();
    let posted = runner.post(move || {
        let result = queued.commit();
        drop(done.send(result));
    });
    let result = if posted {
        finished.recv().unwrap_or_else(|_| prefs.commit())
    } else {
        prefs.commit()
    };
    if let Err(error) = result {
        warn!(target: SECRET_TARGET, error = %error, "failed to persist preferences");
    }
}

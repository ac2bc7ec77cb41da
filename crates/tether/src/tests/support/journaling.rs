//! Secret module that journals its lifecycle.

use tether_module_api::{HostServices, RawSecretModule, SecretModule, into_raw};

use super::Journal;

/// Records "initialize <profile>", "uninitialize" and "release".
pub(crate) struct JournalingModule {
    journal: Journal,
    accept: bool,
    host: Option<HostServices>,
}

impl JournalingModule {
    /// Factory table for a module that accepts or rejects `initialize`.
    pub(crate) fn raw(journal: &Journal, accept: bool) -> RawSecretModule {
        into_raw(Self {
            journal: journal.clone(),
            accept,
            host: None,
        })
    }
}

impl SecretModule for JournalingModule {
    fn initialize(&mut self, host: HostServices) -> bool {
        self.journal
            .record(&format!("initialize {}", host.profile_dir.display()));
        if self.accept {
            self.host = Some(host);
        }
        self.accept
    }

    fn uninitialize(&mut self) {
        self.journal.record("uninitialize");
        self.host = None;
    }
}

impl Drop for JournalingModule {
    fn drop(&mut self) {
        self.journal.record("release");
    }
}

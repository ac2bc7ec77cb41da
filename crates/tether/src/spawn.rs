//! Launches independent child processes.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::info;

const SPAWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::spawn");

/// Abstraction over OS process creation.
pub trait ProcessSpawner: Send + Sync {
    /// Starts `program` with `args`, returning the child's pid.
    ///
    /// The child is detached: the caller never waits on it.
    fn spawn(&self, program: &Path, args: &[OsString]) -> Result<u32, SpawnError>;
}

/// Errors surfaced while launching a child process.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The OS refused to start the program.
    #[error("failed to launch '{program}': {source}")]
    Launch {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Spawner backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessSpawner;

impl ProcessSpawner for SystemProcessSpawner {
    fn spawn(&self, program: &Path, args: &[OsString]) -> Result<u32, SpawnError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let child = command.spawn().map_err(|source| SpawnError::Launch {
            program: program.to_path_buf(),
            source,
        })?;
        let pid = child.id();
        info!(
            target: SPAWN_TARGET,
            pid,
            program = %program.display(),
            "child process launched"
        );
        // Dropping `Child` neither kills nor waits on the process.
        drop(child);
        Ok(pid)
    }
}

//! Lock file standing in for the named single-instance mutex.
//!
//! Ownership is an exclusive `flock` on a lock file that is never removed.
//! The kernel drops the lock when its holder exits, crashed or not, so a
//! leftover file needs no reclaiming. The pid inside is for diagnostics only.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::{info, warn};

use super::INSTANCE_TARGET;
use super::errors::SingleInstanceError;

/// Outcome of a lock attempt.
#[derive(Debug)]
pub(super) enum LockAttempt {
    Acquired(InstanceLock),
    /// Another process holds the lock; the pid is unknown while it is still
    /// being written.
    Held(Option<u32>),
}

pub(super) struct InstanceLock {
    path: PathBuf,
    file: Flock<File>,
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl InstanceLock {
    pub(super) fn acquire(path: &Path) -> Result<LockAttempt, SingleInstanceError> {
        let create_error = |source: io::Error| SingleInstanceError::LockCreate {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(create_error)?;
        let locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((mut held, errno)) if errno == Errno::EWOULDBLOCK => {
                let pid = read_pid(&mut held);
                info!(
                    target: INSTANCE_TARGET,
                    owner_pid = ?pid,
                    "instance lock held by another process"
                );
                return Ok(LockAttempt::Held(pid));
            }
            Err((_, errno)) => return Err(create_error(io::Error::from(errno))),
        };
        record_owner(&locked).map_err(create_error)?;
        info!(
            target: INSTANCE_TARGET,
            file = %path.display(),
            "acquired instance lock"
        );
        Ok(LockAttempt::Acquired(Self {
            path: path.to_path_buf(),
            file: locked,
        }))
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // The flock itself is released when `file` closes.
        if let Err(error) = self.file.set_len(0) {
            warn!(
                target: INSTANCE_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to clear instance lock owner"
            );
        }
    }
}

fn record_owner(file: &File) -> io::Result<()> {
    file.set_len(0)?;
    let mut writer = file;
    writer.rewind()?;
    writeln!(writer, "{}", std::process::id())?;
    file.sync_all()
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    content.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}

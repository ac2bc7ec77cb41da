//! Small filesystem helpers shared by the instance guard and crash server.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Mode for files that carry another process's command line.
#[cfg(unix)]
const PRIVATE_MODE: u32 = 0o600;

/// Replaces `path` with `contents` in one rename, readable only by the owner.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let Some(directory) = path.parent() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        ));
    };
    let mut staged = NamedTempFile::new_in(directory)?;
    restrict(staged.as_file())?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map(drop).map_err(|error| error.error)
}

#[cfg(unix)]
fn restrict(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(PRIVATE_MODE))
}

#[cfg(not(unix))]
const fn restrict(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

/// Removes a file, treating absence as success.
pub(crate) fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

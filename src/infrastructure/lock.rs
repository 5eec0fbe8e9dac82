//! Exclusive run lock on the repository checkout.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::PipelineError;

/// Lock file name created at the repository root
pub const LOCK_FILE_NAME: &str = ".covgen.lock";

/// Held for the duration of a run that writes to the checkout.
/// The lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Create `<repo_root>/.covgen.lock`, failing if it already exists
    pub fn acquire(repo_root: &Path) -> Result<Self, PipelineError> {
        let path = repo_root.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    PipelineError::RunLocked(path.clone())
                } else {
                    PipelineError::io(&path, e)
                }
            })?;

        // pid is informational only
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!(path = %path.display(), error = %e, "Failed to write pid to lock file");
        }
        debug!(path = %path.display(), "Acquired run lock");

        Ok(Self { path })
    }

    /// Location of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove run lock");
        }
    }
}

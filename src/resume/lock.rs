//! Advisory lock on the staging area
//!
//! Two runs writing into the same staging root would race on the ledger and
//! on staged files. The lock is an fd-lock on a file in the staging root; the
//! caller keeps the returned guard alive for the whole run.

use super::state::ResumeError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// File name of the lock inside the staging root
pub const STAGING_LOCK_FILE_NAME: &str = ".staging.lock";

/// Staging area lock
pub struct StagingLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl StagingLock {
    /// Open (creating if needed) the lock file in `staging_root`
    pub fn open(staging_root: &Path) -> Result<Self, ResumeError> {
        let path = staging_root.join(STAGING_LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without blocking
    ///
    /// Fails with [`ResumeError::StagingLocked`] if another holder exists.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, ResumeError> {
        let display = self.path.display().to_string();
        self.lock
            .try_write()
            .map_err(|_| ResumeError::StagingLocked(display))
    }
}

impl std::fmt::Debug for StagingLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingLock").field("path", &self.path).finish()
    }
}

//! atomic::operation
//!
//! Single-file write and read operations.
//!
//! # Architecture
//!
//! An [`Operation`] pairs one exclusive per-path lock with an optional
//! backup handle. Its lifecycle is a straight line:
//!
//! ```text
//! Created -> Locked -> (Written)* -> Committed | RolledBack
//! ```
//!
//! The lock is acquired before the operation is returned to the caller
//! and released by exactly one terminal call. [`ReadOperation`] is the
//! shared-lock counterpart; its terminal call is `complete`.
//!
//! # Invariants
//!
//! - After a terminal call the operation holds no lock and every further
//!   write reports [`OperationError::Finalized`]
//! - A failed staged write leaves the target untouched
//! - Rollback releases the lock even when restoring the backup fails
//! - Dropping a non-finalized operation releases the lock without
//!   restoring anything (commit-like, logged)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::format::{ConfigDescriptor, ConfigFormat, ConfigIo, ConfigMap, FormatError};
use crate::lock::PathLock;
use crate::paths;
use crate::recovery::{BackupError, BackupHandle, BackupService};

/// Errors from single-file operations.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The operation already saw its terminal call.
    #[error("operation already finalized")]
    Finalized,

    /// `create_backup` was called a second time.
    #[error("backup already created for this operation")]
    BackupAlreadyCreated,

    /// The backup service failed.
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    /// Serializing or parsing configuration content failed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The atomic rename over the target failed. The target still holds
    /// its previous content; the staged temp file has been removed.
    #[error("failed to atomically replace {}: {source}", .path.display())]
    Replace {
        /// The target path.
        path: PathBuf,
        /// The rename error.
        source: io::Error,
    },

    /// I/O error preparing the staged write.
    #[error("operation i/o error: {0}")]
    Io(#[from] io::Error),
}

/// One in-flight write to a single configuration file.
///
/// Constructed by [`Manager::begin_operation`](crate::atomic::Manager::begin_operation),
/// which blocks until the exclusive lock is held.
pub struct Operation {
    path: PathBuf,
    lock: Option<Arc<PathLock>>,
    backup: Option<BackupHandle>,
    backup_created: bool,
    started: DateTime<Utc>,
    recovery: Arc<dyn BackupService>,
    io: Arc<dyn ConfigIo>,
}

impl Operation {
    /// Acquire the exclusive lock and construct the operation.
    pub(crate) fn begin(
        path: PathBuf,
        lock: Arc<PathLock>,
        recovery: Arc<dyn BackupService>,
        io: Arc<dyn ConfigIo>,
    ) -> Self {
        lock.lock_exclusive();
        Self {
            path,
            lock: Some(lock),
            backup: None,
            backup_created: false,
            started: Utc::now(),
            recovery,
            io,
        }
    }

    /// The path this operation mutates.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the lock was acquired.
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// Whether a terminal call has already run.
    pub fn is_finalized(&self) -> bool {
        self.lock.is_none()
    }

    /// Snapshot the target's current content before mutating it.
    ///
    /// Must be called at most once, before any `write_config`. When the
    /// target does not exist yet this is a no-op (nothing to protect),
    /// but a second call is still an error.
    pub fn create_backup(&mut self, owner: &str) -> Result<(), OperationError> {
        if self.lock.is_none() {
            return Err(OperationError::Finalized);
        }
        if self.backup_created {
            return Err(OperationError::BackupAlreadyCreated);
        }
        self.backup = self.recovery.create_backup(&self.path, owner)?;
        self.backup_created = true;
        Ok(())
    }

    /// Stage `data` next to the target and atomically rename it into place.
    ///
    /// The serialized bytes go to a uniquely named temp file in the
    /// target's own directory, so the rename stays on one filesystem and
    /// is atomic on POSIX. On any failure the temp file is removed and
    /// the target is untouched.
    ///
    /// Calling this more than once before the terminal call is legal:
    /// each call independently stages and renames, and the last write
    /// wins. Intermediate writes are not individually backed up - a
    /// rollback always restores the state captured by `create_backup`,
    /// discarding every write this operation made.
    pub fn write_config(&self, format: ConfigFormat, data: &ConfigMap) -> Result<(), OperationError> {
        if self.lock.is_none() {
            return Err(OperationError::Finalized);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = paths::sibling_temp_path(&self.path);
        let staged = ConfigDescriptor::new(&temp_path, format);
        if let Err(e) = self.io.save(&staged, data) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        if let Err(source) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(OperationError::Replace {
                path: self.path.clone(),
                source,
            });
        }

        debug!(path = %self.path.display(), "config written");
        Ok(())
    }

    /// Keep the change: release the lock, leave the backup in place for
    /// later inspection. Idempotent no-op once terminal.
    pub fn commit(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.unlock_exclusive();
            debug!(path = %self.path.display(), "operation committed");
        }
    }

    /// Undo the change: restore the backup (when one exists), discard the
    /// backup artifact, and release the lock.
    ///
    /// The lock is released even when restoration fails; the restore
    /// error is returned to the caller. Idempotent no-op once terminal.
    pub fn rollback(&mut self) -> Result<(), OperationError> {
        if self.lock.is_none() {
            return Ok(());
        }

        let result = match self.backup.take() {
            Some(handle) => match self.recovery.restore_backup(&handle, &self.path) {
                Ok(()) => self
                    .recovery
                    .discard_backup(handle)
                    .map_err(OperationError::from),
                Err(e) => Err(e.into()),
            },
            None => Ok(()),
        };

        // The release mirrors a deferred unlock: it runs no matter how
        // the restore went.
        if let Some(lock) = self.lock.take() {
            lock.unlock_exclusive();
        }

        match &result {
            Ok(()) => debug!(path = %self.path.display(), "operation rolled back"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "rollback restore failed"),
        }
        result
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            warn!(path = %self.path.display(), "operation dropped without terminal call");
            lock.unlock_exclusive();
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("path", &self.path)
            .field("locked", &self.lock.is_some())
            .field("backup", &self.backup)
            .field("started", &self.started)
            .finish()
    }
}

/// One in-flight read of a single configuration file.
///
/// Holds the shared lock; any number of read operations on the same path
/// coexist, while a write operation excludes them all.
pub struct ReadOperation {
    path: PathBuf,
    lock: Option<Arc<PathLock>>,
    started: DateTime<Utc>,
    io: Arc<dyn ConfigIo>,
}

impl ReadOperation {
    /// Acquire the shared lock and construct the operation.
    pub(crate) fn begin(path: PathBuf, lock: Arc<PathLock>, io: Arc<dyn ConfigIo>) -> Self {
        lock.lock_shared();
        Self {
            path,
            lock: Some(lock),
            started: Utc::now(),
            io,
        }
    }

    /// The path this operation reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the lock was acquired.
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// Load the file through the format adapter while the lock is held.
    pub fn read_config(&self, format: ConfigFormat) -> Result<ConfigMap, OperationError> {
        if self.lock.is_none() {
            return Err(OperationError::Finalized);
        }
        let descriptor = ConfigDescriptor::new(&self.path, format);
        Ok(self.io.load(&descriptor)?)
    }

    /// Release the shared lock. Idempotent.
    pub fn complete(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.unlock_shared();
        }
    }
}

impl Drop for ReadOperation {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.unlock_shared();
        }
    }
}

impl std::fmt::Debug for ReadOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOperation")
            .field("path", &self.path)
            .field("locked", &self.lock.is_some())
            .field("started", &self.started)
            .finish()
    }
}

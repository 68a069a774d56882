//! recovery::traits
//!
//! Backup service abstraction consumed by the write engine.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup store location could not be determined or created.
    #[error("backup store unavailable: {0}")]
    StoreUnavailable(String),

    /// Reading the source or backup content failed.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing the backup or restored content failed.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The handle does not point at an existing backup.
    #[error("backup not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The handle points outside the backup store.
    #[error("backup path escapes the store: {}", .0.display())]
    OutsideStore(PathBuf),

    /// I/O error during backup bookkeeping.
    #[error("backup i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque token identifying one recoverable prior version of a file.
///
/// The engine only ever receives a handle from [`BackupService::create_backup`]
/// and hands it back to `restore_backup`/`discard_backup`; it never looks
/// inside. Only the implementing store interprets the location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle(PathBuf);

impl BackupHandle {
    /// Wrap a store location. For [`BackupService`] implementations.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self(location.into())
    }

    /// The store location this handle points at. For implementations.
    pub fn location(&self) -> &Path {
        &self.0
    }
}

/// Aggregate statistics reported by a backup store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupStats {
    /// Store location, for display.
    pub backup_directory: PathBuf,
    /// Number of backups currently held.
    pub total_backups: usize,
    /// Total bytes across all held backups.
    pub total_size_bytes: u64,
}

/// Backup & recovery service consumed by the write engine.
///
/// Implementations must be shareable across the operation threads that
/// hold per-path locks.
pub trait BackupService: Send + Sync {
    /// Snapshot `path` under `owner`'s name.
    ///
    /// Returns `Ok(None)` when the source file does not exist: there is
    /// nothing to protect, and a later restore is not required.
    fn create_backup(&self, path: &Path, owner: &str)
        -> Result<Option<BackupHandle>, BackupError>;

    /// Restore the content behind `handle` over `target`.
    fn restore_backup(&self, handle: &BackupHandle, target: &Path) -> Result<(), BackupError>;

    /// Remove the backup behind `handle` from the store.
    ///
    /// Called after a successful rollback so no artifacts remain; missing
    /// backups are not an error.
    fn discard_backup(&self, handle: BackupHandle) -> Result<(), BackupError>;

    /// Aggregate store statistics for the health/metrics surface.
    fn stats(&self) -> BackupStats;

    /// Verify the store is usable (exists, writable).
    fn health_check(&self) -> Result<(), BackupError>;
}

//! recovery::file_store
//!
//! File-backed backup store.
//!
//! # Storage
//!
//! - `~/.confguard/backups/<owner>_<timestamp>_<seq>.backup`
//!
//! The timestamp is second-resolution; the sequence number disambiguates
//! backups created within the same second. Restores only accept handles
//! that resolve inside the backup directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, warn};

use super::traits::{BackupError, BackupHandle, BackupService, BackupStats};

/// Sequence counter shared by all stores in the process, so two managers
/// pointed at the same directory still produce distinct names.
static BACKUP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Information about one stored backup.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    /// File name inside the backup directory.
    pub name: String,
    /// Full path of the backup file.
    pub path: PathBuf,
    /// When the backup was written (filesystem mtime).
    pub created: std::time::SystemTime,
    /// Size in bytes.
    pub size: u64,
}

/// Backup store keeping timestamped copies in a flat directory.
///
/// # Example
///
/// ```ignore
/// use confguard::recovery::{BackupService, FileBackupManager};
///
/// let store = FileBackupManager::new()?;
/// if let Some(handle) = store.create_backup(config_path, "ghostty")? {
///     // mutate the file ...
///     store.restore_backup(&handle, config_path)?;
/// }
/// ```
#[derive(Debug)]
pub struct FileBackupManager {
    backup_dir: PathBuf,
}

impl FileBackupManager {
    /// Create a store at the default location, `~/.confguard/backups`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::StoreUnavailable`] when the home directory
    /// cannot be determined or the backup directory cannot be created.
    pub fn new() -> Result<Self, BackupError> {
        let home = dirs::home_dir()
            .ok_or_else(|| BackupError::StoreUnavailable("cannot determine home directory".into()))?;
        Self::with_dir(home.join(".confguard").join("backups"))
    }

    /// Create a store at a custom directory. Primarily useful for tests.
    pub fn with_dir(backup_dir: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let backup_dir = backup_dir.into();
        fs::create_dir_all(&backup_dir).map_err(|e| {
            BackupError::StoreUnavailable(format!(
                "cannot create {}: {}",
                backup_dir.display(),
                e
            ))
        })?;
        Ok(Self { backup_dir })
    }

    /// The directory backups are stored in.
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// List stored backups, newest first. An empty `owner` lists all.
    pub fn list_backups(&self, owner: &str) -> Result<Vec<BackupInfo>, BackupError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{}_", owner);
        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".backup") {
                continue;
            }
            if !owner.is_empty() && !name.starts_with(&prefix) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            backups.push(BackupInfo {
                path: entry.path(),
                created: meta.modified().unwrap_or(std::time::UNIX_EPOCH),
                size: meta.len(),
                name,
            });
        }

        backups.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(backups)
    }

    /// Remove old backups for `owner`, keeping the `keep` most recent.
    pub fn cleanup_old_backups(&self, owner: &str, keep: usize) -> Result<(), BackupError> {
        let backups = self.list_backups(owner)?;
        for stale in backups.iter().skip(keep) {
            if let Err(e) = fs::remove_file(&stale.path) {
                // Individual removals are best-effort; the next cleanup
                // gets another chance.
                warn!(path = %stale.path.display(), error = %e, "failed to remove old backup");
            }
        }
        Ok(())
    }

    /// A handle is only honored if it resolves inside the backup dir.
    fn contained(&self, location: &Path) -> bool {
        let canonical_dir = self
            .backup_dir
            .canonicalize()
            .unwrap_or_else(|_| self.backup_dir.clone());
        // A missing backup still needs a containment verdict (so the
        // caller sees NotFound, not a traversal rejection): canonicalize
        // the parent and re-attach the file name.
        let canonical = location.canonicalize().unwrap_or_else(|_| {
            match (location.parent(), location.file_name()) {
                (Some(parent), Some(name)) => parent
                    .canonicalize()
                    .map(|p| p.join(name))
                    .unwrap_or_else(|_| location.to_path_buf()),
                _ => location.to_path_buf(),
            }
        });
        canonical.starts_with(&canonical_dir)
    }
}

impl BackupService for FileBackupManager {
    fn create_backup(
        &self,
        path: &Path,
        owner: &str,
    ) -> Result<Option<BackupHandle>, BackupError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            // No file, nothing to protect.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(BackupError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let seq = BACKUP_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}_{}_{:04}.backup", owner, timestamp, seq);
        let backup_path = self.backup_dir.join(name);

        fs::write(&backup_path, data).map_err(|source| BackupError::Write {
            path: backup_path.clone(),
            source,
        })?;

        debug!(source = %path.display(), backup = %backup_path.display(), "backup created");
        Ok(Some(BackupHandle::new(backup_path)))
    }

    fn restore_backup(&self, handle: &BackupHandle, target: &Path) -> Result<(), BackupError> {
        let location = handle.location();
        if !self.contained(location) {
            return Err(BackupError::OutsideStore(location.to_path_buf()));
        }

        let data = match fs::read(location) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(location.to_path_buf()))
            }
            Err(source) => {
                return Err(BackupError::Read {
                    path: location.to_path_buf(),
                    source,
                })
            }
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| BackupError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(target, data).map_err(|source| BackupError::Write {
            path: target.to_path_buf(),
            source,
        })?;

        debug!(backup = %location.display(), target = %target.display(), "backup restored");
        Ok(())
    }

    fn discard_backup(&self, handle: BackupHandle) -> Result<(), BackupError> {
        let location = handle.location();
        if !self.contained(location) {
            return Err(BackupError::OutsideStore(location.to_path_buf()));
        }
        match fs::remove_file(location) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn stats(&self) -> BackupStats {
        let mut stats = BackupStats {
            backup_directory: self.backup_dir.clone(),
            ..BackupStats::default()
        };
        if let Ok(backups) = self.list_backups("") {
            stats.total_backups = backups.len();
            stats.total_size_bytes = backups.iter().map(|b| b.size).sum();
        }
        stats
    }

    fn health_check(&self) -> Result<(), BackupError> {
        fs::create_dir_all(&self.backup_dir).map_err(|e| {
            BackupError::StoreUnavailable(format!(
                "backup directory not accessible: {}",
                e
            ))
        })?;

        let probe = self.backup_dir.join(".health_check");
        fs::write(&probe, b"probe").map_err(|source| BackupError::Write {
            path: probe.clone(),
            source,
        })?;
        let _ = fs::remove_file(&probe);
        Ok(())
    }
}

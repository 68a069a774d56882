//! atomic::manager
//!
//! Entry point for the write engine.
//!
//! # Architecture
//!
//! The manager owns the three pieces every operation needs: the per-path
//! lock registry, the backup service, and the format adapter. The two
//! services sit behind trait objects so alternate stores and parsers swap
//! in without touching any caller.
//!
//! # Example
//!
//! ```ignore
//! use confguard::atomic::Manager;
//! use confguard::format::ConfigFormat;
//!
//! let manager = Manager::new()?;
//! let mut op = manager.begin_operation(&config_path);
//! op.create_backup("ghostty")?;
//! op.write_config(ConfigFormat::Json, &data)?;
//! op.commit();
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::format::{BuiltinIo, ConfigIo};
use crate::lock::LockRegistry;
use crate::paths;
use crate::recovery::{BackupError, BackupService, BackupStats, FileBackupManager};

use super::operation::{Operation, ReadOperation};
use super::safe::SafeOperation;
use super::transaction::Transaction;

/// Point-in-time statistics for the health/metrics surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStats {
    /// Number of distinct paths with a registered lock.
    pub active_locks: usize,
    /// Delegated statistics from the backup service.
    pub backup_stats: BackupStats,
}

/// Owns the lock registry and service seams; hands out operations.
pub struct Manager {
    registry: LockRegistry,
    recovery: Arc<dyn BackupService>,
    io: Arc<dyn ConfigIo>,
}

impl Manager {
    /// Manager with the default services: file-backed backups under the
    /// user's home and the built-in JSON/TOML adapter.
    ///
    /// # Errors
    ///
    /// Returns an error when the backup store cannot be initialized.
    pub fn new() -> Result<Self, BackupError> {
        Ok(Self::with_services(
            Arc::new(FileBackupManager::new()?),
            Arc::new(BuiltinIo::new()),
        ))
    }

    /// Manager with injected services.
    pub fn with_services(recovery: Arc<dyn BackupService>, io: Arc<dyn ConfigIo>) -> Self {
        Self {
            registry: LockRegistry::new(),
            recovery,
            io,
        }
    }

    /// Begin an exclusive write operation on `path`.
    ///
    /// Blocks until every reader and writer of the same path has released
    /// its lock. Within one path, writers are totally ordered by the
    /// order their `begin_operation` calls win the lock.
    pub fn begin_operation(&self, path: &Path) -> Operation {
        let path = paths::normalize(path);
        let lock = self.registry.lock_for(&path);
        Operation::begin(path, lock, Arc::clone(&self.recovery), Arc::clone(&self.io))
    }

    /// Begin a shared read operation on `path`.
    ///
    /// Blocks only while a writer holds (or is waiting for) the path.
    pub fn begin_read_operation(&self, path: &Path) -> ReadOperation {
        let path = paths::normalize(path);
        let lock = self.registry.lock_for(&path);
        ReadOperation::begin(path, lock, Arc::clone(&self.io))
    }

    /// Begin an empty multi-file transaction.
    pub fn begin_transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Begin an operation wrapped in automatic rollback-on-failure.
    ///
    /// Like `begin_operation`, this blocks until the exclusive lock for
    /// `path` is held.
    pub fn safe_operation(&self, path: &Path) -> SafeOperation {
        SafeOperation::new(self.begin_operation(path))
    }

    /// Verify the engine's collaborators are usable.
    pub fn health_check(&self) -> Result<(), BackupError> {
        self.recovery.health_check()
    }

    /// Registry size plus delegated backup statistics.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            active_locks: self.registry.len(),
            backup_stats: self.recovery.stats(),
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("active_locks", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::BuiltinIo;
    use tempfile::TempDir;

    fn test_manager(root: &Path) -> Manager {
        let store = FileBackupManager::with_dir(root.join("backups")).expect("backup store");
        Manager::with_services(Arc::new(store), Arc::new(BuiltinIo::new()))
    }

    #[test]
    fn stats_track_registry_growth() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());

        assert_eq!(manager.stats().active_locks, 0);

        let mut a = manager.begin_operation(&temp.path().join("a.json"));
        a.commit();
        let mut b = manager.begin_operation(&temp.path().join("b.json"));
        b.commit();
        // Same path again: no new lock.
        let mut a2 = manager.begin_operation(&temp.path().join("a.json"));
        a2.commit();

        assert_eq!(manager.stats().active_locks, 2);
    }

    #[test]
    fn stats_delegate_backup_stats() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());

        let target = temp.path().join("c.json");
        std::fs::write(&target, "{}").expect("seed");

        let mut op = manager.begin_operation(&target);
        op.create_backup("app").expect("backup");
        op.commit();

        let stats = manager.stats();
        assert_eq!(stats.backup_stats.total_backups, 1);
    }

    #[test]
    fn health_check_delegates_to_backup_service() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());
        manager.health_check().expect("healthy");
    }

    #[test]
    fn lock_identity_survives_path_spelling() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());

        let plain = temp.path().join("app.json");
        let spelled = temp.path().join(".").join("app.json");

        let mut op = manager.begin_operation(&plain);
        op.commit();
        let mut op = manager.begin_operation(&spelled);
        op.commit();

        assert_eq!(manager.stats().active_locks, 1);
    }
}

//! atomic::facade
//!
//! Convenience API over registry, operations, transactions, and the safe
//! wrapper.
//!
//! # Architecture
//!
//! Thin composition for the common call shapes. Typed errors from the
//! layers below cross this boundary as `anyhow::Error`, matching what the
//! caller-supplied closures themselves return. The multi-file form
//! guarantees a full transaction rollback runs before any error - from
//! backup creation or from the closure - reaches the caller.

use std::path::Path;

use anyhow::ensure;
use tracing::warn;

use super::manager::Manager;
use super::operation::{Operation, ReadOperation};
use crate::recovery::BackupError;

/// High-level locking helpers for single- and multi-file callers.
#[derive(Debug)]
pub struct LockManager {
    manager: Manager,
}

impl LockManager {
    /// Facade over a manager with default services.
    pub fn new() -> Result<Self, BackupError> {
        Ok(Self {
            manager: Manager::new()?,
        })
    }

    /// Facade over an existing manager.
    pub fn with_manager(manager: Manager) -> Self {
        Self { manager }
    }

    /// The underlying manager, for callers needing the full API.
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Run `f` while holding the shared lock on `path`.
    pub fn with_read_lock<T, F>(&self, path: &Path, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&ReadOperation) -> anyhow::Result<T>,
    {
        let mut read_op = self.manager.begin_read_operation(path);
        let result = f(&read_op);
        read_op.complete();
        result
    }

    /// Run `f` inside a safe operation: backup first, commit on success,
    /// rollback on error or panic.
    pub fn with_write_lock<F>(&self, path: &Path, owner: &str, f: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Operation) -> anyhow::Result<()>,
    {
        self.manager
            .safe_operation(path)
            .execute(owner, f)
            .map_err(Into::into)
    }

    /// Run `f` holding write locks on every path, with one backup per
    /// file, committing all or rolling back all.
    ///
    /// Locks are acquired in the order given; callers locking overlapping
    /// path sets should pass them in a consistent order.
    pub fn with_multiple_locks<F>(
        &self,
        paths: &[&Path],
        owners: &[&str],
        f: F,
    ) -> anyhow::Result<()>
    where
        F: FnOnce(&mut [Operation]) -> anyhow::Result<()>,
    {
        ensure!(
            paths.len() == owners.len(),
            "paths ({}) and owners ({}) must have the same length",
            paths.len(),
            owners.len()
        );

        let mut tx = self.manager.begin_transaction();
        for path in paths {
            tx.add_operation(path)?;
        }

        // create_backups rolls everything back itself on failure.
        tx.create_backups(owners)?;

        if let Err(caller) = f(tx.operations_mut()) {
            if let Err(e) = tx.rollback() {
                warn!(error = %e, "transaction rollback after failed mutation also failed");
            }
            return Err(caller);
        }

        tx.commit()?;
        Ok(())
    }
}

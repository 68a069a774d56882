//! atomic::transaction
//!
//! Multi-file transactions.
//!
//! # Architecture
//!
//! A transaction is an ordered list of operations. Locks are acquired in
//! the order paths are added and released in **reverse** order during
//! rollback, which shrinks the deadlock window when transactions overlap
//! on paths. Two transactions that lock the same set of paths in
//! consistently different orders can still deadlock; that is an accepted
//! limitation, not a solved problem.
//!
//! # Invariants
//!
//! - Once committed or rolled back, a transaction rejects every further
//!   call with [`TransactionError::Finalized`] (terminal methods never
//!   re-run)
//! - `create_backups` is all-or-nothing: the first failure rolls back
//!   everything backed up so far, so no file is left half-protected
//! - Rollback continues past individual failures and reports the last
//!   error it saw
//!
//! Exclusive access is compiler-enforced here (`&mut self` throughout)
//! rather than guarded by a runtime mutex.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use super::manager::Manager;
use super::operation::{Operation, OperationError};

/// Errors from multi-file transactions.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The transaction already saw a terminal call.
    #[error("transaction already finalized")]
    Finalized,

    /// `create_backups` received the wrong number of owner labels.
    #[error("owner count ({owners}) does not match operation count ({operations})")]
    OwnerCountMismatch {
        /// Labels supplied.
        owners: usize,
        /// Operations in the transaction.
        operations: usize,
    },

    /// Backup creation failed for one operation; everything backed up
    /// before it has been rolled back.
    #[error("failed to create backup for operation {index}: {source}")]
    Backup {
        /// Index of the failing operation (insertion order).
        index: usize,
        /// The underlying failure.
        #[source]
        source: OperationError,
    },

    /// Rollback finished but at least one operation failed to restore;
    /// this is the last error encountered.
    #[error("rollback finished with failures: {0}")]
    Rollback(#[source] OperationError),
}

/// An ordered set of operations that commit together or roll back
/// together (best-effort; see the module docs for the limits).
#[derive(Debug)]
pub struct Transaction<'m> {
    manager: &'m Manager,
    operations: Vec<Operation>,
    committed: bool,
    rolled_back: bool,
}

impl<'m> Transaction<'m> {
    pub(crate) fn new(manager: &'m Manager) -> Self {
        Self {
            manager,
            operations: Vec::new(),
            committed: false,
            rolled_back: false,
        }
    }

    /// Whether a terminal call has already run.
    pub fn is_finalized(&self) -> bool {
        self.committed || self.rolled_back
    }

    /// Number of operations added so far.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the transaction holds no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Begin (and lock) a new operation on `path` and append it.
    ///
    /// Blocks until the path's exclusive lock is held, like
    /// [`Manager::begin_operation`].
    pub fn add_operation(&mut self, path: &Path) -> Result<&mut Operation, TransactionError> {
        if self.is_finalized() {
            return Err(TransactionError::Finalized);
        }
        self.operations.push(self.manager.begin_operation(path));
        let index = self.operations.len() - 1;
        Ok(&mut self.operations[index])
    }

    /// The operations in insertion order, for the caller's mutation logic.
    pub fn operations_mut(&mut self) -> &mut [Operation] {
        &mut self.operations
    }

    /// Create one backup per operation, pairing `owners[i]` with the
    /// i-th operation in insertion order.
    ///
    /// On the first failure every backup created so far is rolled back
    /// and the transaction is finalized: partial protection is worse than
    /// none, because a later rollback would restore only some files.
    pub fn create_backups(&mut self, owners: &[&str]) -> Result<(), TransactionError> {
        if self.is_finalized() {
            return Err(TransactionError::Finalized);
        }
        if owners.len() != self.operations.len() {
            return Err(TransactionError::OwnerCountMismatch {
                owners: owners.len(),
                operations: self.operations.len(),
            });
        }

        let mut failure = None;
        for (index, op) in self.operations.iter_mut().enumerate() {
            if let Err(source) = op.create_backup(owners[index]) {
                failure = Some((index, source));
                break;
            }
        }

        if let Some((index, source)) = failure {
            let _ = self.rollback_internal();
            return Err(TransactionError::Backup { index, source });
        }
        Ok(())
    }

    /// Commit every operation in insertion order and finalize.
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        if self.is_finalized() {
            return Err(TransactionError::Finalized);
        }
        for op in &mut self.operations {
            op.commit();
        }
        self.committed = true;
        debug!(operations = self.operations.len(), "transaction committed");
        Ok(())
    }

    /// Roll back every operation in reverse insertion order and finalize.
    ///
    /// Individual failures do not stop the sweep; the last error is
    /// returned after every operation has been attempted.
    pub fn rollback(&mut self) -> Result<(), TransactionError> {
        if self.is_finalized() {
            return Err(TransactionError::Finalized);
        }
        self.rollback_internal()
    }

    fn rollback_internal(&mut self) -> Result<(), TransactionError> {
        let mut last_error = None;
        for op in self.operations.iter_mut().rev() {
            if let Err(e) = op.rollback() {
                last_error = Some(e);
            }
        }
        self.rolled_back = true;
        debug!(operations = self.operations.len(), "transaction rolled back");
        match last_error {
            Some(e) => Err(TransactionError::Rollback(e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::Manager;
    use crate::format::{BuiltinIo, ConfigFormat, ConfigMap};
    use crate::recovery::FileBackupManager;
    use serde_json::json;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_manager(root: &std::path::Path) -> Manager {
        let store = FileBackupManager::with_dir(root.join("backups")).expect("backup store");
        Manager::with_services(Arc::new(store), Arc::new(BuiltinIo::new()))
    }

    fn map(pairs: &[(&str, serde_json::Value)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn commit_applies_all_operations() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());
        let a = temp.path().join("a.json");
        let b = temp.path().join("b.json");

        let mut tx = manager.begin_transaction();
        tx.add_operation(&a)
            .expect("add a")
            .write_config(ConfigFormat::Json, &map(&[("f", json!(1))]))
            .expect("write a");
        tx.add_operation(&b)
            .expect("add b")
            .write_config(ConfigFormat::Json, &map(&[("f", json!(2))]))
            .expect("write b");
        tx.commit().expect("commit");

        assert!(fs::read_to_string(&a).expect("a").contains("\"f\": 1"));
        assert!(fs::read_to_string(&b).expect("b").contains("\"f\": 2"));
    }

    #[test]
    fn rollback_restores_every_file() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());
        let a = temp.path().join("a.json");
        let b = temp.path().join("b.json");
        fs::write(&a, "{\"v\": \"a0\"}").expect("seed a");
        fs::write(&b, "{\"v\": \"b0\"}").expect("seed b");

        let mut tx = manager.begin_transaction();
        tx.add_operation(&a).expect("add a");
        tx.add_operation(&b).expect("add b");
        tx.create_backups(&["app-a", "app-b"]).expect("backups");

        for op in tx.operations_mut() {
            op.write_config(ConfigFormat::Json, &map(&[("v", json!("changed"))]))
                .expect("write");
        }
        tx.rollback().expect("rollback");

        assert_eq!(fs::read_to_string(&a).expect("a"), "{\"v\": \"a0\"}");
        assert_eq!(fs::read_to_string(&b).expect("b"), "{\"v\": \"b0\"}");
    }

    #[test]
    fn finalized_transaction_rejects_everything() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());

        let mut tx = manager.begin_transaction();
        tx.add_operation(&temp.path().join("a.json")).expect("add");
        tx.commit().expect("commit");

        assert!(matches!(
            tx.add_operation(&temp.path().join("b.json")),
            Err(TransactionError::Finalized)
        ));
        assert!(matches!(tx.commit(), Err(TransactionError::Finalized)));
        assert!(matches!(tx.rollback(), Err(TransactionError::Finalized)));
        assert!(matches!(
            tx.create_backups(&[]),
            Err(TransactionError::Finalized)
        ));
    }

    #[test]
    fn owner_count_mismatch_is_rejected() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());

        let mut tx = manager.begin_transaction();
        tx.add_operation(&temp.path().join("a.json")).expect("add");

        let err = tx.create_backups(&["one", "two"]).unwrap_err();
        assert!(matches!(err, TransactionError::OwnerCountMismatch { owners: 2, operations: 1 }));

        // The transaction is still usable after the arity error.
        tx.create_backups(&["one"]).expect("backups");
        tx.commit().expect("commit");
    }

    #[test]
    fn locks_released_after_commit() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());
        let a = temp.path().join("a.json");

        let mut tx = manager.begin_transaction();
        tx.add_operation(&a).expect("add");
        tx.commit().expect("commit");

        // Re-locking the same path must not block.
        let mut op = manager.begin_operation(&a);
        op.commit();
    }

    #[test]
    fn locks_released_after_rollback() {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());
        let a = temp.path().join("a.json");

        let mut tx = manager.begin_transaction();
        tx.add_operation(&a).expect("add");
        tx.rollback().expect("rollback");

        let mut op = manager.begin_operation(&a);
        op.commit();
    }
}

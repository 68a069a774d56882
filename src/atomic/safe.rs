//! atomic::safe
//!
//! All-or-nothing wrapper around caller-supplied mutation logic.
//!
//! # Architecture
//!
//! `SafeOperation::execute` is the one place in the crate where abrupt
//! termination of caller code (a panic) is caught and converted into an
//! error value. Whatever happens inside the closure - clean failure or
//! panic - the operation rolls back before the error surfaces; only a
//! clean success commits. Callers never have to remember to roll back.

use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;
use tracing::warn;

use super::operation::{Operation, OperationError};

/// Errors from [`SafeOperation::execute`].
#[derive(Debug, Error)]
pub enum SafeOperationError {
    /// The pre-mutation backup could not be created; the mutation was
    /// never run and the lock has been released.
    #[error("failed to create backup: {0}")]
    Backup(#[source] OperationError),

    /// The caller's mutation logic returned an error; the operation was
    /// rolled back before this surfaced.
    #[error(transparent)]
    Caller(#[from] anyhow::Error),

    /// The caller's mutation logic panicked; the operation was rolled
    /// back and the panic payload is carried here instead of propagating.
    #[error("operation panicked: {0}")]
    Panicked(String),
}

/// An operation that commits only when the caller's closure succeeds.
#[derive(Debug)]
pub struct SafeOperation {
    operation: Operation,
}

impl SafeOperation {
    pub(crate) fn new(operation: Operation) -> Self {
        Self { operation }
    }

    /// Back up the target, run `f`, then commit on success or roll back
    /// on failure or panic.
    ///
    /// Consumes the wrapper: after `execute` returns, the operation has
    /// seen its terminal call either way.
    ///
    /// # Errors
    ///
    /// - [`SafeOperationError::Backup`] when the snapshot fails (the
    ///   closure is not run)
    /// - [`SafeOperationError::Caller`] carrying the closure's own error
    /// - [`SafeOperationError::Panicked`] carrying the panic payload text
    pub fn execute<F>(mut self, owner: &str, f: F) -> Result<(), SafeOperationError>
    where
        F: FnOnce(&mut Operation) -> anyhow::Result<()>,
    {
        if let Err(e) = self.operation.create_backup(owner) {
            // Nothing was written; releasing the lock is all the cleanup
            // there is.
            self.operation.commit();
            return Err(SafeOperationError::Backup(e));
        }

        match catch_unwind(AssertUnwindSafe(|| f(&mut self.operation))) {
            Ok(Ok(())) => {
                self.operation.commit();
                Ok(())
            }
            Ok(Err(caller)) => {
                self.rollback_quietly();
                Err(SafeOperationError::Caller(caller))
            }
            Err(payload) => {
                self.rollback_quietly();
                Err(SafeOperationError::Panicked(panic_message(payload)))
            }
        }
    }

    /// The failure already owns the error channel; a rollback problem on
    /// top of it is logged, not returned.
    fn rollback_quietly(&mut self) {
        if let Err(e) = self.operation.rollback() {
            warn!(path = %self.operation.path().display(), error = %e, "rollback after failed mutation also failed");
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

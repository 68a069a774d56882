//! atomic
//!
//! Operations, transactions, and the facades composing the write engine.
//!
//! # Modules
//!
//! - [`manager`] - Entry point owning the lock registry and service seams
//! - [`operation`] - Single-file write/read operations (lock lifecycle)
//! - [`transaction`] - Multi-file transactions with reverse-order rollback
//! - [`safe`] - All-or-nothing wrapper converting panics to errors
//! - [`facade`] - `with_*` convenience API over all of the above
//!
//! # Architecture
//!
//! Every mutation of a configuration file:
//! 1. Acquires the exclusive per-path lock (`Manager::begin_operation`)
//! 2. Optionally snapshots the current content (`Operation::create_backup`)
//! 3. Stages the new content next to the target and atomically renames it
//!    into place (`Operation::write_config`)
//! 4. Ends with exactly one terminal call: `commit` (keep the change,
//!    release the lock) or `rollback` (restore the snapshot, release the
//!    lock)
//!
//! Multi-file callers use [`Transaction`]; callers that want rollback
//! handled for them use [`SafeOperation`] or the [`LockManager`] facade.

pub mod facade;
pub mod manager;
pub mod operation;
pub mod safe;
pub mod transaction;

pub use facade::LockManager;
pub use manager::{Manager, ManagerStats};
pub use operation::{Operation, OperationError, ReadOperation};
pub use safe::{SafeOperation, SafeOperationError};
pub use transaction::{Transaction, TransactionError};

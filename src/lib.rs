//! Confguard - an atomic mutation engine for on-disk configuration files
//!
//! Confguard lets tooling rewrite configuration files belonging to
//! third-party applications without ever leaving a file corrupt or
//! half-written, even under concurrent access or mid-operation failure.
//!
//! # Architecture
//!
//! The crate is layered, leaves first:
//!
//! - [`lock`] - Per-path reader/writer lock registry
//! - [`staging`] - Staged-write engine (temp copies, integrity hashes,
//!   lock markers, backup rotation, atomic rename)
//! - [`recovery`] - Backup & recovery service boundary and its file-backed
//!   implementation
//! - [`format`] - Format loader/saver boundary (JSON and TOML built in)
//! - [`atomic`] - Operations, transactions, the safe-operation wrapper,
//!   and the lock-manager facade composing all of the above
//! - [`paths`] - Centralized naming for staging and backup artifacts
//!
//! # Correctness Invariants
//!
//! 1. A target file observed at any instant is either fully the old
//!    content or fully the new content (staged write + atomic rename)
//! 2. At most one writer per path; readers share, writers exclude
//! 3. Every rollback releases its lock, even when restoration fails
//! 4. Panics in caller-supplied mutation logic never escape
//!    [`atomic::SafeOperation`] without a rollback having run

pub mod atomic;
pub mod format;
pub mod lock;
pub mod paths;
pub mod recovery;
pub mod staging;

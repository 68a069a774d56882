//! lock::path_lock
//!
//! Blocking reader/writer lock with an explicit acquire/release API.
//!
//! # Architecture
//!
//! Operations acquire a lock when they are constructed and release it in
//! their terminal call (`commit`, `rollback`, `complete`), which can be an
//! arbitrary number of method calls later. Guard-based locks cannot span
//! that gap from inside an owned struct, so `PathLock` exposes explicit
//! `lock_*`/`unlock_*` pairs over a `Mutex` + `Condvar` core.
//!
//! # Invariants
//!
//! - One writer excludes all readers and other writers
//! - Any number of readers may hold the lock concurrently
//! - Arriving readers yield to waiting writers (no writer starvation)
//! - Unlocking wakes all waiters; each re-checks its own admission rule
//!
//! # Example
//!
//! ```
//! use confguard::lock::PathLock;
//!
//! let lock = PathLock::new();
//! lock.lock_exclusive();
//! // ... mutate the file ...
//! lock.unlock_exclusive();
//! ```

use std::sync::{Condvar, Mutex, PoisonError};

/// Reader/writer admission state.
#[derive(Debug, Default)]
struct LockState {
    /// A writer currently holds the lock.
    writer: bool,
    /// Number of readers currently holding the lock.
    readers: usize,
    /// Writers blocked waiting for the lock; readers yield to them.
    writers_waiting: usize,
}

/// A blocking reader/writer lock for one configuration file path.
///
/// Unlike `std::sync::RwLock`, acquisition and release are separate calls,
/// because operations hold the lock across method-call boundaries. The
/// caller is responsible for pairing every `lock_*` with the matching
/// `unlock_*`; the operation types in [`crate::atomic`] do this with
/// take-on-terminal plus a release-on-drop safety net.
#[derive(Debug, Default)]
pub struct PathLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl PathLock {
    /// Create an unlocked path lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the exclusive (writer) lock is held.
    pub fn lock_exclusive(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.writers_waiting += 1;
        while state.writer || state.readers > 0 {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.writers_waiting -= 1;
        state.writer = true;
    }

    /// Release the exclusive lock and wake all waiters.
    pub fn unlock_exclusive(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(state.writer, "unlock_exclusive without a held writer lock");
        state.writer = false;
        drop(state);
        self.cond.notify_all();
    }

    /// Block until a shared (reader) lock is held.
    ///
    /// Readers admitted while a writer is waiting would starve it, so
    /// arriving readers also wait for `writers_waiting` to drain.
    pub fn lock_shared(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.writer || state.writers_waiting > 0 {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.readers += 1;
    }

    /// Release a shared lock; the last reader out wakes waiting writers.
    pub fn unlock_shared(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(state.readers > 0, "unlock_shared without a held reader lock");
        state.readers = state.readers.saturating_sub(1);
        let empty = state.readers == 0;
        drop(state);
        if empty {
            self.cond.notify_all();
        }
    }

    /// Whether a writer currently holds the lock. Test/diagnostic use only;
    /// the answer can be stale by the time the caller acts on it.
    pub fn is_write_locked(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .writer
    }
}

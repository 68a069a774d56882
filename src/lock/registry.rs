//! lock::registry
//!
//! Lazily populated map from configuration file path to its lock.
//!
//! # Architecture
//!
//! The registry mutex is held only for the map lookup/insert; blocking on
//! the returned per-path lock happens in the caller, outside the registry
//! mutex. Registry contention is therefore O(map lookup) regardless of how
//! long individual file locks are held.
//!
//! # Invariants
//!
//! - Exactly one [`PathLock`] instance exists per normalized path for the
//!   lifetime of the registry
//! - Locks are never evicted (bounded by the number of distinct
//!   configuration files touched during the process lifetime)
//!
//! # Example
//!
//! ```
//! use confguard::lock::LockRegistry;
//! use std::path::Path;
//!
//! let registry = LockRegistry::new();
//! let lock = registry.lock_for(Path::new("/etc/app/config.json"));
//! lock.lock_exclusive();
//! // ... mutate ...
//! lock.unlock_exclusive();
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::paths::normalize;

use super::path_lock::PathLock;

/// Registry of per-path reader/writer locks.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<PathBuf, Arc<PathLock>>>,
}

impl LockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve (or lazily create) the lock for a path.
    ///
    /// The same lexical path always resolves to the same lock instance.
    /// Callers block on the returned lock themselves, outside the registry
    /// mutex.
    pub fn lock_for(&self, path: &Path) -> Arc<PathLock> {
        let key = normalize(path);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Number of distinct paths with a registered lock.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no path has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! staging
//!
//! Staged-write engine for long-lived configuration edits.
//!
//! # Architecture
//!
//! Where the operation layer in [`crate::atomic`] stages and renames in a
//! single call, this engine supports editor-style workflows: take a
//! private temp copy of the file, let the caller mutate the copy for as
//! long as needed, then commit it back with backup rotation and an atomic
//! rename. Integrity is tracked with a SHA-256 hash of the pre-mutation
//! original, and each staged copy is guarded by a lock marker so two
//! editors cannot stage the same file at once.
//!
//! # Storage
//!
//! - `<staging_dir>/` - process-scoped directory, mode `0700`
//! - `<staging_dir>/config_<pid>_<unixnano>.tmp` - staged copies
//! - `<staging_dir>/config_<pid>_<unixnano>.tmp.lock` - lock markers
//! - `<original>.backup`, `<original>.backup.1`, ... - rotated backups,
//!   newest is `.backup` itself
//!
//! # Invariants
//!
//! - At most one live staged copy per original path at a time
//! - A failed commit never leaves the original missing: the newest
//!   rotated backup is restored, and a double failure surfaces both errors
//! - Stale staging state (crashed writers) is reclaimable by age without
//!   external cleanup
//!
//! # Example
//!
//! ```ignore
//! use confguard::staging::TempFileManager;
//!
//! let manager = TempFileManager::new()?;
//! let staged = manager.create_temp_copy(&config_path)?;
//! std::fs::write(&staged.temp_path, "font-size = 14\n")?;
//! manager.validate_temp(&staged)?;
//! manager.commit_temp(&staged)?;
//! ```

pub mod lockfile;

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::paths;

use lockfile::MarkerState;

/// Errors from the staged-write engine.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The staging directory could not be created or is not writable.
    #[error("staging directory unavailable: {0}")]
    DirUnavailable(String),

    /// Another live staged edit already covers this path.
    #[error("{} is already being staged (marker: {})", .path.display(), .marker.display())]
    AlreadyLocked {
        /// The original path under edit.
        path: PathBuf,
        /// The marker file guarding it.
        marker: PathBuf,
    },

    /// Hashing the original file failed.
    #[error("failed to hash {}: {source}", .path.display())]
    Hash {
        /// File being hashed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Copying the original into the staging directory failed.
    #[error("failed to stage copy of {}: {source}", .path.display())]
    Copy {
        /// File being staged.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Writing or locking the marker file failed.
    #[error("failed to write lock marker {}: {source}", .path.display())]
    Marker {
        /// Marker path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The staged copy has gone missing before commit.
    #[error("staged file missing: {}", .0.display())]
    TempMissing(PathBuf),

    /// The staged copy is empty; committing it would truncate the target.
    #[error("staged file is empty: {}", .0.display())]
    TempEmpty(PathBuf),

    /// The commit target is a directory.
    #[error("cannot overwrite directory {}", .0.display())]
    TargetIsDirectory(PathBuf),

    /// Rotating backups of the original failed.
    #[error("failed to create backup for {}: {source}", .path.display())]
    Backup {
        /// The original being backed up.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The atomic replace failed but the original was restored.
    #[error("failed to commit staged changes to {}: {source}", .path.display())]
    Commit {
        /// The commit target.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The atomic replace failed and so did restoring the backup. The
    /// target is in an unknown state and needs manual attention.
    #[error("commit failed and backup restore failed: commit={commit}, restore={restore}")]
    CommitAndRestoreFailed {
        /// The rename error.
        commit: io::Error,
        /// The restoration error.
        restore: io::Error,
    },

    /// The destination did not exist after a reportedly successful commit.
    #[error("commit verification failed: {} does not exist", .0.display())]
    VerifyFailed(PathBuf),

    /// Restoring the newest backup during rollback failed.
    #[error("failed to restore backup over {}: {source}", .path.display())]
    Restore {
        /// The original path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The operation was cancelled between buffered chunks.
    #[error("staging operation cancelled")]
    Cancelled,

    /// Uncategorized I/O error.
    #[error("staging i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Cooperative cancellation flag checked between buffered read/write
/// chunks during hashing and copying. Coarse-grained: a chunk in flight
/// always completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StagingError> {
        if self.is_cancelled() {
            Err(StagingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One staged edit: a private temp copy with integrity tracking.
#[derive(Debug, Clone)]
pub struct TempFile {
    /// The file being edited.
    pub original_path: PathBuf,
    /// The private copy inside the staging directory.
    pub temp_path: PathBuf,
    /// Where the newest rotated backup will go on commit.
    pub backup_path: PathBuf,
    /// SHA-256 of the pre-mutation original; empty if it did not exist.
    pub original_hash: String,
    /// When the staged copy was created.
    pub created_at: DateTime<Utc>,
    /// The marker file guarding this edit.
    pub lock_path: PathBuf,
}

/// A tracked edit plus the open marker handle holding its advisory lock.
#[derive(Debug)]
struct ActiveEdit {
    info: TempFile,
    /// Kept open for the advisory lock; dropping it releases the lock.
    _marker: File,
}

/// Configuration for [`TempFileManager`].
#[derive(Debug, Clone)]
pub struct StagingOptions {
    /// Directory staged copies live in.
    pub staging_dir: PathBuf,
    /// Rotated backup generations to keep per original.
    pub max_backups: usize,
    /// Age beyond which staging state counts as stale.
    pub max_temp_age: Duration,
    /// Chunk size for buffered copy and hash loops.
    pub buffer_size: usize,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            staging_dir: paths::default_staging_dir(),
            max_backups: 5,
            max_temp_age: Duration::from_secs(24 * 60 * 60),
            buffer_size: 32 * 1024,
        }
    }
}

/// Point-in-time metrics for the staged-write engine.
///
/// `operations` and `errors` are monotonic counters; the rest is static
/// configuration. Intended for operational observability, not control
/// flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagingMetrics {
    /// Staging calls attempted (create + commit).
    pub operations: u64,
    /// Staging calls that failed.
    pub errors: u64,
    /// Currently tracked staged edits.
    pub temp_files: usize,
    /// The staging directory.
    pub temp_dir: PathBuf,
    /// Configured backup generations.
    pub max_backups: usize,
    /// Configured staleness threshold.
    pub max_temp_age: Duration,
    /// Configured copy/hash chunk size.
    pub buffer_size: usize,
}

/// Staged-write engine over a dedicated staging directory.
///
/// See the [module docs](self) for the protocol.
#[derive(Debug)]
pub struct TempFileManager {
    staging_dir: PathBuf,
    max_backups: usize,
    max_temp_age: Duration,
    buffer_size: usize,
    active: Mutex<HashMap<PathBuf, ActiveEdit>>,
    operations: AtomicU64,
    errors: AtomicU64,
}

impl TempFileManager {
    /// Create a manager with default options (process-scoped staging dir,
    /// five backup generations, 24h staleness, 32 KiB buffers).
    pub fn new() -> Result<Self, StagingError> {
        Self::with_options(StagingOptions::default())
    }

    /// Create a manager with explicit options.
    ///
    /// # Errors
    ///
    /// [`StagingError::DirUnavailable`] when the staging directory cannot
    /// be created or is not writable.
    pub fn with_options(options: StagingOptions) -> Result<Self, StagingError> {
        fs::create_dir_all(&options.staging_dir).map_err(|e| {
            StagingError::DirUnavailable(format!(
                "cannot create {}: {}",
                options.staging_dir.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&options.staging_dir, fs::Permissions::from_mode(0o700)).map_err(
                |e| {
                    StagingError::DirUnavailable(format!(
                        "cannot restrict {}: {}",
                        options.staging_dir.display(),
                        e
                    ))
                },
            )?;
        }

        // Probe write access up front so failures surface at construction.
        let probe = options.staging_dir.join(".probe");
        fs::write(&probe, b"probe").map_err(|e| {
            StagingError::DirUnavailable(format!(
                "{} is not writable: {}",
                options.staging_dir.display(),
                e
            ))
        })?;
        let _ = fs::remove_file(&probe);

        Ok(Self {
            staging_dir: options.staging_dir,
            max_backups: options.max_backups,
            max_temp_age: options.max_temp_age,
            buffer_size: options.buffer_size,
            active: Mutex::new(HashMap::new()),
            operations: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    /// The staging directory in use.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// The configured staleness threshold.
    pub fn max_temp_age(&self) -> Duration {
        self.max_temp_age
    }

    /// Stage a private copy of `original` for editing.
    ///
    /// Computes the SHA-256 of the current content (empty string if the
    /// file does not exist yet), copies it byte-for-byte into the staging
    /// directory, and writes a lock marker next to the copy.
    ///
    /// # Errors
    ///
    /// [`StagingError::AlreadyLocked`] when a live staged edit already
    /// covers this path; staging failures clean up after themselves.
    pub fn create_temp_copy(&self, original: &Path) -> Result<TempFile, StagingError> {
        self.create_temp_copy_cancellable(original, &CancelToken::new())
    }

    /// [`create_temp_copy`](Self::create_temp_copy) with a cancellation
    /// token checked between buffered chunks.
    pub fn create_temp_copy_cancellable(
        &self,
        original: &Path,
        cancel: &CancelToken,
    ) -> Result<TempFile, StagingError> {
        self.operations.fetch_add(1, Ordering::Relaxed);

        let original = paths::normalize(original);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(e) = cancel.check() {
            return self.fail(e);
        }

        // A tracked edit blocks a second staging attempt unless its
        // marker has gone stale (crashed or cleaned-up writer).
        let tracked = active.get(&original).map(|existing| {
            (
                lockfile::inspect(&existing.info.lock_path, self.max_temp_age),
                existing.info.lock_path.clone(),
            )
        });
        if let Some((state, marker)) = tracked {
            match state {
                MarkerState::OwnedBySelf | MarkerState::Held => {
                    return self.fail(StagingError::AlreadyLocked {
                        path: original,
                        marker,
                    });
                }
                MarkerState::Absent | MarkerState::Stale => {
                    if let Some(stale) = active.remove(&original) {
                        self.remove_artifacts(&stale.info);
                    }
                }
            }
        }

        let original_hash = match self.hash_file(&original, cancel) {
            Ok(hash) => hash,
            Err(e) => return self.fail(e),
        };

        let temp_path = self.staging_dir.join(paths::staged_file_name());
        if let Err(e) = self.copy_file(&original, &temp_path, cancel) {
            return self.fail(StagingError::Copy {
                path: original,
                source: e,
            });
        }

        let lock_path = paths::lock_marker_path(&temp_path);
        let marker = match lockfile::write_held(&lock_path) {
            Ok(marker) => marker,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return self.fail(StagingError::Marker {
                    path: lock_path,
                    source: e,
                });
            }
        };

        let info = TempFile {
            backup_path: paths::backup_path(&original),
            original_path: original.clone(),
            temp_path,
            original_hash,
            created_at: Utc::now(),
            lock_path,
        };

        debug!(
            original = %info.original_path.display(),
            temp = %info.temp_path.display(),
            "staged copy created"
        );
        active.insert(
            original,
            ActiveEdit {
                info: info.clone(),
                _marker: marker,
            },
        );
        Ok(info)
    }

    /// Reject a staged copy that is missing or zero-length.
    pub fn validate_temp(&self, staged: &TempFile) -> Result<(), StagingError> {
        let meta = fs::metadata(&staged.temp_path)
            .map_err(|_| StagingError::TempMissing(staged.temp_path.clone()))?;
        if meta.len() == 0 {
            return Err(StagingError::TempEmpty(staged.temp_path.clone()));
        }
        Ok(())
    }

    /// Commit the staged copy over the original.
    ///
    /// Rotates numbered backups of the existing original, atomically
    /// renames the staged copy into place, and cleans up the staging
    /// state. A failed rename restores the newest backup; when that
    /// restoration also fails, both errors surface together because the
    /// target is in an unknown state.
    pub fn commit_temp(&self, staged: &TempFile) -> Result<(), StagingError> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(e) = self.validate_temp(staged) {
            return self.fail(e);
        }

        let original_exists = match fs::metadata(&staged.original_path) {
            Ok(meta) if meta.is_dir() => {
                return self.fail(StagingError::TargetIsDirectory(staged.original_path.clone()))
            }
            Ok(_) => true,
            Err(_) => false,
        };

        if original_exists {
            if let Err(e) = self.rotate_backups(&staged.original_path, &staged.backup_path) {
                return self.fail(StagingError::Backup {
                    path: staged.original_path.clone(),
                    source: e,
                });
            }
        }

        if let Some(parent) = staged.original_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return self.fail(StagingError::Commit {
                    path: staged.original_path.clone(),
                    source: e,
                });
            }
        }

        if let Err(commit_err) = self.atomic_rename(&staged.temp_path, &staged.original_path) {
            if original_exists {
                if let Err(restore_err) =
                    self.atomic_rename(&staged.backup_path, &staged.original_path)
                {
                    return self.fail(StagingError::CommitAndRestoreFailed {
                        commit: commit_err,
                        restore: restore_err,
                    });
                }
            }
            return self.fail(StagingError::Commit {
                path: staged.original_path.clone(),
                source: commit_err,
            });
        }

        if !staged.original_path.exists() {
            if original_exists {
                let _ = self.atomic_rename(&staged.backup_path, &staged.original_path);
            }
            return self.fail(StagingError::VerifyFailed(staged.original_path.clone()));
        }

        self.remove_artifacts(staged);
        active.remove(&staged.original_path);
        debug!(target = %staged.original_path.display(), "staged commit complete");
        Ok(())
    }

    /// Discard the staged copy and restore the newest backup if present.
    ///
    /// Staged changes are intentionally ignored; the newest rotated
    /// backup, when one exists, moves back over the original.
    pub fn rollback(&self, staged: &TempFile) -> Result<(), StagingError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove_artifacts(staged);
        active.remove(&staged.original_path);

        if staged.backup_path.exists() {
            fs::rename(&staged.backup_path, &staged.original_path).map_err(|e| {
                StagingError::Restore {
                    path: staged.original_path.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }

    /// The tracked staged edit for `original`, if one exists.
    pub fn get_temp_file(&self, original: &Path) -> Option<TempFile> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.get(&paths::normalize(original)).map(|e| e.info.clone())
    }

    /// Force-remove staging state older than `max_age`.
    ///
    /// Bypasses the lock checks: entries this old belong to writers that
    /// are assumed dead, which is what bounds resource leakage from
    /// crashed processes. Also sweeps untracked files of that age out of
    /// the staging directory.
    pub fn cleanup_stale(&self, max_age: Duration) -> Result<(), StagingError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Utc::now();
        let stale: Vec<PathBuf> = active
            .iter()
            .filter(|(_, edit)| {
                (now - edit.info.created_at).to_std().unwrap_or_default() > max_age
            })
            .map(|(path, _)| path.clone())
            .collect();

        for path in stale {
            if let Some(edit) = active.remove(&path) {
                debug!(original = %path.display(), "reclaiming stale staged edit");
                self.remove_artifacts(&edit.info);
            }
        }
        drop(active);

        // Untracked leftovers (a previous manager in this directory that
        // never shut down cleanly) age out the same way.
        if let Ok(entries) = fs::read_dir(&self.staging_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let old = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|mtime| mtime.elapsed().ok())
                    .map(|age| age > max_age)
                    .unwrap_or(false);
                if old && !self.is_tracked(&path) {
                    let _ = fs::remove_file(&path);
                }
            }
        }

        Ok(())
    }

    /// Discard every tracked staged edit and its artifacts.
    pub fn cleanup_all(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, edit) in active.drain() {
            self.remove_artifacts(&edit.info);
        }
    }

    /// Tear down the manager: drop all staged state and remove the
    /// staging directory when it is empty. Also runs on drop.
    pub fn close(&self) {
        self.cleanup_all();
        let _ = fs::remove_dir(&self.staging_dir);
    }

    /// Current metrics snapshot.
    pub fn metrics(&self) -> StagingMetrics {
        let temp_files = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        StagingMetrics {
            operations: self.operations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            temp_files,
            temp_dir: self.staging_dir.clone(),
            max_backups: self.max_backups,
            max_temp_age: self.max_temp_age,
            buffer_size: self.buffer_size,
        }
    }

    /// Spawn a background thread that reclaims stale staging state every
    /// `interval` until the token is cancelled.
    pub fn spawn_periodic_cleanup(
        manager: Arc<Self>,
        interval: Duration,
        cancel: CancelToken,
    ) -> thread::JoinHandle<()> {
        let interval = if interval.is_zero() {
            Duration::from_secs(60 * 60)
        } else {
            interval
        };
        thread::spawn(move || {
            let slice = Duration::from_millis(50);
            'outer: loop {
                let mut slept = Duration::ZERO;
                while slept < interval {
                    if cancel.is_cancelled() {
                        break 'outer;
                    }
                    let nap = slice.min(interval - slept);
                    thread::sleep(nap);
                    slept += nap;
                }
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(e) = manager.cleanup_stale(manager.max_temp_age) {
                    warn!(error = %e, "periodic staging cleanup failed");
                }
            }
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn fail<T>(&self, error: StagingError) -> Result<T, StagingError> {
        self.errors.fetch_add(1, Ordering::Relaxed);
        Err(error)
    }

    fn is_tracked(&self, artifact: &Path) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active
            .values()
            .any(|e| e.info.temp_path == artifact || e.info.lock_path == artifact)
    }

    /// Remove the temp copy and marker of a staged edit, best-effort.
    fn remove_artifacts(&self, staged: &TempFile) {
        let _ = fs::remove_file(&staged.temp_path);
        let _ = fs::remove_file(&staged.lock_path);
    }

    /// SHA-256 of a file's content; empty string when the file is absent.
    fn hash_file(&self, path: &Path, cancel: &CancelToken) -> Result<String, StagingError> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
            Err(source) => {
                return Err(StagingError::Hash {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            cancel.check()?;
            let n = file.read(&mut buf).map_err(|source| StagingError::Hash {
                path: path.to_path_buf(),
                source,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Buffered copy with cancellation checks between chunks. A missing
    /// source stages as an empty file (new configuration file case).
    fn copy_file(&self, src: &Path, dst: &Path, cancel: &CancelToken) -> io::Result<()> {
        let src_meta = match fs::metadata(src) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let Some(src_meta) = src_meta else {
            let file = File::create(dst)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            return file.sync_all();
        };

        if src_meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot stage directory {}", src.display()),
            ));
        }

        let mut source = File::open(src)?;
        let mut dest = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(dst)?;
        dest.set_permissions(src_meta.permissions())?;

        let mut buf = vec![0u8; self.buffer_size];
        let copied: io::Result<()> = loop {
            if cancel.is_cancelled() {
                break Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
            }
            let n = match source.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e),
            };
            if let Err(e) = dest.write_all(&buf[..n]) {
                break Err(e);
            }
        };

        match copied.and_then(|()| dest.sync_all()) {
            Ok(()) => Ok(()),
            Err(e) => {
                drop(dest);
                let _ = fs::remove_file(dst);
                Err(e)
            }
        }
    }

    /// Rotate `<dst>`, `<dst>.1`, ... before copying `src` into `<dst>`.
    ///
    /// The oldest generation beyond `max_backups` is overwritten by the
    /// rotation rename; individual rotation failures are logged and
    /// skipped so a commit is never blocked by a cosmetic rename.
    fn rotate_backups(&self, src: &Path, dst: &Path) -> io::Result<()> {
        for i in (1..self.max_backups).rev() {
            let older = paths::backup_generation_path(dst, i);
            if older.exists() {
                let newer = paths::backup_generation_path(dst, i + 1);
                if let Err(e) = fs::rename(&older, &newer) {
                    warn!(from = %older.display(), error = %e, "backup rotation rename failed");
                }
            }
        }

        if dst.exists() {
            let first = paths::backup_generation_path(dst, 1);
            if let Err(e) = fs::rename(dst, &first) {
                warn!(from = %dst.display(), error = %e, "backup rotation rename failed");
            }
        }

        self.copy_file(src, dst, &CancelToken::new())
    }

    /// Atomic replace with platform fallbacks: Windows pre-deletes the
    /// destination; a cross-device rename falls back to copy-and-delete.
    fn atomic_rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        #[cfg(windows)]
        if dst.exists() {
            let _ = fs::remove_file(dst);
        }

        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                match self.copy_file(src, dst, &CancelToken::new()) {
                    Ok(()) => {
                        let _ = fs::remove_file(src);
                        Ok(())
                    }
                    Err(copy_err) => Err(io::Error::new(
                        rename_err.kind(),
                        format!(
                            "rename failed ({}); copy fallback failed ({})",
                            rename_err, copy_err
                        ),
                    )),
                }
            }
        }
    }
}

impl Drop for TempFileManager {
    fn drop(&mut self) {
        self.close();
    }
}

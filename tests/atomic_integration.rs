//! Integration tests for the operation/transaction layer.
//!
//! These exercise the full flow against real files: stage + rename
//! writes, backup-based rollback, transaction all-or-nothing semantics,
//! and the safe-operation and facade wrappers.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use confguard::atomic::{LockManager, Manager, SafeOperationError, TransactionError};
use confguard::format::{BuiltinIo, ConfigFormat, ConfigMap};
use confguard::recovery::{
    BackupError, BackupHandle, BackupService, BackupStats, FileBackupManager,
};

// =============================================================================
// Test Fixtures
// =============================================================================

fn test_manager(root: &Path) -> Manager {
    let store = FileBackupManager::with_dir(root.join("backups")).expect("backup store");
    Manager::with_services(Arc::new(store), Arc::new(BuiltinIo::new()))
}

fn map(pairs: &[(&str, serde_json::Value)]) -> ConfigMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Backup service that starts failing after a configured number of
/// successful backups, for exercising partial-failure paths.
struct FlakyBackupService {
    inner: FileBackupManager,
    succeed_first: usize,
    calls: AtomicUsize,
}

impl FlakyBackupService {
    fn new(root: &Path, succeed_first: usize) -> Self {
        Self {
            inner: FileBackupManager::with_dir(root.join("flaky-backups")).expect("backup store"),
            succeed_first,
            calls: AtomicUsize::new(0),
        }
    }
}

impl BackupService for FlakyBackupService {
    fn create_backup(
        &self,
        path: &Path,
        owner: &str,
    ) -> Result<Option<BackupHandle>, BackupError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.succeed_first {
            return Err(BackupError::StoreUnavailable("injected failure".into()));
        }
        self.inner.create_backup(path, owner)
    }

    fn restore_backup(&self, handle: &BackupHandle, target: &Path) -> Result<(), BackupError> {
        self.inner.restore_backup(handle, target)
    }

    fn discard_backup(&self, handle: BackupHandle) -> Result<(), BackupError> {
        self.inner.discard_backup(handle)
    }

    fn stats(&self) -> BackupStats {
        self.inner.stats()
    }

    fn health_check(&self) -> Result<(), BackupError> {
        self.inner.health_check()
    }
}

// =============================================================================
// Operation round trips
// =============================================================================

#[test]
fn write_commit_write_commit_accumulates() {
    let temp = TempDir::new().expect("create temp dir");
    let manager = test_manager(temp.path());
    let target = temp.path().join("settings.json");

    for v in 0..3 {
        let mut op = manager.begin_operation(&target);
        op.create_backup("app").expect("backup");
        op.write_config(ConfigFormat::Json, &map(&[("v", json!(v))]))
            .expect("write");
        op.commit();
    }

    let content = fs::read_to_string(&target).expect("read");
    assert!(content.contains("\"v\": 2"));
}

#[test]
fn rollback_is_byte_exact() {
    let temp = TempDir::new().expect("create temp dir");
    let manager = test_manager(temp.path());
    let target = temp.path().join("settings.json");

    let original = "{\n  \"keep\": \"me\",\n  \"weird-spacing\":   3\n}\n";
    fs::write(&target, original).expect("seed");

    let mut op = manager.begin_operation(&target);
    op.create_backup("app").expect("backup");
    op.write_config(ConfigFormat::Json, &map(&[("replaced", json!(true))]))
        .expect("write");
    op.rollback().expect("rollback");

    assert_eq!(fs::read_to_string(&target).expect("read"), original);
}

#[test]
fn rollback_after_multiple_writes_restores_pre_operation_state() {
    // Last-write-wins is deliberate: intermediate writes are not
    // individually backed up, so a rollback jumps all the way back.
    let temp = TempDir::new().expect("create temp dir");
    let manager = test_manager(temp.path());
    let target = temp.path().join("settings.json");
    fs::write(&target, "{\"v\": \"original\"}").expect("seed");

    let mut op = manager.begin_operation(&target);
    op.create_backup("app").expect("backup");
    op.write_config(ConfigFormat::Json, &map(&[("v", json!("first"))]))
        .expect("first write");
    op.write_config(ConfigFormat::Json, &map(&[("v", json!("second"))]))
        .expect("second write");
    op.rollback().expect("rollback");

    assert_eq!(
        fs::read_to_string(&target).expect("read"),
        "{\"v\": \"original\"}"
    );
}

#[test]
fn toml_targets_work_end_to_end() {
    let temp = TempDir::new().expect("create temp dir");
    let manager = test_manager(temp.path());
    let target = temp.path().join("settings.toml");

    let mut op = manager.begin_operation(&target);
    op.write_config(
        ConfigFormat::Toml,
        &map(&[("enabled", json!(true)), ("retries", json!(3))]),
    )
    .expect("write");
    op.commit();

    let mut read = manager.begin_read_operation(&target);
    let data = read.read_config(ConfigFormat::Toml).expect("read");
    read.complete();

    assert_eq!(data.get("enabled"), Some(&json!(true)));
    assert_eq!(data.get("retries"), Some(&json!(3)));
}

// =============================================================================
// Transactions
// =============================================================================

#[test]
fn partial_backup_failure_rolls_back_and_releases_every_lock() {
    let temp = TempDir::new().expect("create temp dir");
    // Two backups succeed, the third fails.
    let flaky = FlakyBackupService::new(temp.path(), 2);
    let manager = Manager::with_services(Arc::new(flaky), Arc::new(BuiltinIo::new()));

    let paths: Vec<_> = (0..3)
        .map(|i| temp.path().join(format!("f{}.json", i)))
        .collect();
    for path in &paths {
        fs::write(path, format!("{{\"file\": {:?}}}", path.file_name())).expect("seed");
    }
    let seeded: Vec<_> = paths
        .iter()
        .map(|p| fs::read_to_string(p).expect("read seed"))
        .collect();

    let mut tx = manager.begin_transaction();
    for path in &paths {
        tx.add_operation(path).expect("add");
    }

    let err = tx.create_backups(&["a", "b", "c"]).unwrap_err();
    match err {
        TransactionError::Backup { index, .. } => assert_eq!(index, 2),
        other => panic!("expected Backup error, got {:?}", other),
    }
    assert!(tx.is_finalized());

    // Nothing changed on disk and every lock is free again.
    for (path, before) in paths.iter().zip(&seeded) {
        assert_eq!(&fs::read_to_string(path).expect("read"), before);
        let mut op = manager.begin_operation(path);
        op.commit();
    }
}

#[test]
fn transaction_rollback_reports_last_error_but_sweeps_everything() {
    let temp = TempDir::new().expect("create temp dir");
    let manager = test_manager(temp.path());
    let a = temp.path().join("a.json");
    let b = temp.path().join("b.json");
    fs::write(&a, "{\"v\": \"a0\"}").expect("seed a");
    fs::write(&b, "{\"v\": \"b0\"}").expect("seed b");

    let mut tx = manager.begin_transaction();
    tx.add_operation(&a).expect("add a");
    tx.add_operation(&b).expect("add b");
    tx.create_backups(&["a", "b"]).expect("backups");

    for op in tx.operations_mut() {
        op.write_config(ConfigFormat::Json, &map(&[("v", json!("dirty"))]))
            .expect("write");
    }

    // Sabotage one backup so its restore fails, then roll back.
    let stats = manager.stats();
    let backup_dir = stats.backup_stats.backup_directory.clone();
    let victim = fs::read_dir(&backup_dir)
        .expect("read backup dir")
        .flatten()
        .find(|e| e.file_name().to_string_lossy().starts_with("a_"))
        .expect("backup for a");
    fs::remove_file(victim.path()).expect("remove backup");

    let err = tx.rollback().unwrap_err();
    assert!(matches!(err, TransactionError::Rollback(_)));

    // The other file was still restored, and both locks are free.
    assert_eq!(fs::read_to_string(&b).expect("b"), "{\"v\": \"b0\"}");
    for path in [&a, &b] {
        let mut op = manager.begin_operation(path);
        op.commit();
    }
}

// =============================================================================
// Safe operations and the facade
// =============================================================================

#[test]
fn safe_operation_backup_failure_never_runs_the_closure() {
    let temp = TempDir::new().expect("create temp dir");
    let flaky = FlakyBackupService::new(temp.path(), 0);
    let manager = Manager::with_services(Arc::new(flaky), Arc::new(BuiltinIo::new()));

    let target = temp.path().join("config.json");
    fs::write(&target, "{}").expect("seed");

    let ran = AtomicUsize::new(0);
    let err = manager
        .safe_operation(&target)
        .execute("app", |_| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, SafeOperationError::Backup(_)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    // Lock released even though nothing ran.
    let mut op = manager.begin_operation(&target);
    op.commit();
}

#[test]
fn facade_multiple_locks_survive_panic_free_failures_repeatedly() {
    let temp = TempDir::new().expect("create temp dir");
    let facade = LockManager::with_manager(test_manager(temp.path()));
    let a = temp.path().join("a.json");
    let b = temp.path().join("b.json");
    fs::write(&a, "{\"v\": 0}").expect("seed a");
    fs::write(&b, "{\"v\": 0}").expect("seed b");

    for round in 0..3 {
        let err = facade
            .with_multiple_locks(&[&a, &b], &["a", "b"], |ops| {
                for op in ops.iter_mut() {
                    op.write_config(ConfigFormat::Json, &map(&[("round", json!(round))]))?;
                }
                anyhow::bail!("round {} rejected", round)
            })
            .unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }

    assert_eq!(fs::read_to_string(&a).expect("a"), "{\"v\": 0}");
    assert_eq!(fs::read_to_string(&b).expect("b"), "{\"v\": 0}");
}

#[test]
fn stats_surface_active_locks_and_backups() {
    let temp = TempDir::new().expect("create temp dir");
    let manager = test_manager(temp.path());

    let target = temp.path().join("config.json");
    fs::write(&target, "{}").expect("seed");

    let mut op = manager.begin_operation(&target);
    op.create_backup("app").expect("backup");
    op.commit();

    let stats = manager.stats();
    assert_eq!(stats.active_locks, 1);
    assert_eq!(stats.backup_stats.total_backups, 1);
    manager.health_check().expect("healthy");
}

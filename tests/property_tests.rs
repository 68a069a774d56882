//! Property-based tests for the write engine.
//!
//! These use proptest to verify the byte-exactness invariants hold for
//! arbitrary file content, not just the hand-picked fixtures in the
//! other suites.

use std::fs;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use confguard::atomic::Manager;
use confguard::format::{BuiltinIo, ConfigFormat, ConfigMap};
use confguard::recovery::FileBackupManager;
use confguard::staging::{StagingOptions, TempFileManager};

fn test_manager(root: &std::path::Path) -> Manager {
    let store = FileBackupManager::with_dir(root.join("backups")).expect("backup store");
    Manager::with_services(Arc::new(store), Arc::new(BuiltinIo::new()))
}

proptest! {
    // Filesystem-heavy cases; keep the count moderate.
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever bytes the original held, a staged commit replaces them
    /// with exactly the staged bytes and keeps the original as the
    /// newest backup.
    #[test]
    fn staged_commit_is_byte_exact(
        original in prop::collection::vec(any::<u8>(), 1..4096),
        replacement in prop::collection::vec(any::<u8>(), 1..4096),
    ) {
        let temp = TempDir::new().expect("create temp dir");
        let manager = TempFileManager::with_options(StagingOptions {
            staging_dir: temp.path().join("staging"),
            ..StagingOptions::default()
        })
        .expect("create staging manager");

        let config = temp.path().join("config");
        fs::write(&config, &original).expect("seed");

        let staged = manager.create_temp_copy(&config).expect("stage");
        prop_assert_eq!(&fs::read(&staged.temp_path).expect("read temp"), &original);

        fs::write(&staged.temp_path, &replacement).expect("edit");
        manager.commit_temp(&staged).expect("commit");

        prop_assert_eq!(&fs::read(&config).expect("read target"), &replacement);
        prop_assert_eq!(&fs::read(&staged.backup_path).expect("read backup"), &original);
    }

    /// backup -> write -> rollback restores the original byte-for-byte,
    /// regardless of what the original contained.
    #[test]
    fn operation_rollback_is_byte_exact(
        original in prop::collection::vec(any::<u8>(), 0..2048),
        value in any::<i64>(),
    ) {
        let temp = TempDir::new().expect("create temp dir");
        let manager = test_manager(temp.path());

        let target = temp.path().join("target.json");
        fs::write(&target, &original).expect("seed");

        let mut op = manager.begin_operation(&target);
        op.create_backup("prop").expect("backup");

        let mut data = ConfigMap::new();
        data.insert("v".into(), json!(value));
        op.write_config(ConfigFormat::Json, &data).expect("write");
        op.rollback().expect("rollback");

        prop_assert_eq!(&fs::read(&target).expect("read target"), &original);
    }

    /// A staged rollback leaves no trace of the scratch content.
    #[test]
    fn staged_rollback_discards_scratch(
        original in prop::collection::vec(any::<u8>(), 1..1024),
        scratch in prop::collection::vec(any::<u8>(), 1..1024),
    ) {
        let temp = TempDir::new().expect("create temp dir");
        let manager = TempFileManager::with_options(StagingOptions {
            staging_dir: temp.path().join("staging"),
            ..StagingOptions::default()
        })
        .expect("create staging manager");

        let config = temp.path().join("config");
        fs::write(&config, &original).expect("seed");

        let staged = manager.create_temp_copy(&config).expect("stage");
        fs::write(&staged.temp_path, &scratch).expect("edit");
        manager.rollback(&staged).expect("rollback");

        prop_assert_eq!(&fs::read(&config).expect("read target"), &original);
        prop_assert!(!staged.temp_path.exists());
        prop_assert!(!staged.lock_path.exists());
    }
}

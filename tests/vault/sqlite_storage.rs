//! On-disk SQLite persistence across reopen.

use std::sync::Arc;

use sysvault::{ErrorKind, SecretStorage, SqliteStorage, VaultConfig};

use crate::common::{fast_config, key, FailingStorage, Harness, NOTE, PASSWORD, PIN, USER};

#[test]
fn secrets_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vault.db");

    {
        let storage = SqliteStorage::open(&path).expect("open");
        let h = Harness::new(Arc::new(storage), fast_config());
        h.fields.upsert(key(1, PIN), "4321").expect("upsert");
        h.fields.upsert(key(1, NOTE), "visible").expect("upsert");
    }

    let storage = SqliteStorage::open(&path).expect("reopen");
    let h = Harness::existing(Arc::new(storage), fast_config());
    assert_eq!(
        h.fields.read(key(1, PIN)).expect("read").as_deref(),
        Some("4321")
    );
    assert_eq!(
        h.fields.read(key(1, NOTE)).expect("read").as_deref(),
        Some("visible")
    );
}

#[test]
fn rotation_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vault.db");

    {
        let storage = SqliteStorage::open(&path).expect("open");
        let h = Harness::new(Arc::new(storage), fast_config());
        h.fields.upsert(key(1, PIN), "4321").expect("upsert");
        h.rotation
            .rotate(USER, b"next master material", PASSWORD)
            .expect("rotate");
    }

    let storage = SqliteStorage::open(&path).expect("reopen");
    let h = Harness::existing(Arc::new(storage), fast_config());
    assert_eq!(
        h.fields.read(key(1, PIN)).expect("read").as_deref(),
        Some("4321")
    );
}

#[test]
fn failed_rotation_rolls_back_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vault.db");

    let storage = Arc::new(FailingStorage::new(
        SqliteStorage::open(&path).expect("open"),
    ));
    let h = Harness::new(Arc::clone(&storage), fast_config());
    for owner in 1..4 {
        h.fields.upsert(key(owner, PIN), "4321").expect("upsert");
    }
    let fields_before = h.storage.all_fields().expect("all");
    let record_before = h.master_record();

    storage.fail_update(2);
    let err = h
        .rotation
        .rotate(USER, b"next master material", PASSWORD)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    drop(h);
    drop(storage);

    let reopened = Arc::new(SqliteStorage::open(&path).expect("reopen"));
    assert_eq!(reopened.all_fields().expect("all"), fields_before);
    assert_eq!(
        reopened.get_master_record(USER).expect("get"),
        Some(record_before)
    );
}

#[test]
fn config_file_points_at_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("from-config.db");
    let config_path = dir.path().join("vault.json");
    std::fs::write(
        &config_path,
        format!(
            r#"{{ "database_path": {}, "kdf": {{ "memory_kib": 1024, "iterations": 1, "parallelism": 1 }} }}"#,
            serde_json::to_string(&db_path).expect("path json")
        ),
    )
    .expect("write config");

    let config = VaultConfig::from_path(&config_path).expect("load config");
    let path = config.database_path.clone().expect("database_path set");
    let h = Harness::new(Arc::new(SqliteStorage::open(&path).expect("open")), config);
    h.fields.upsert(key(1, PIN), "x").expect("upsert");
    assert!(db_path.exists());
}

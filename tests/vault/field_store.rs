//! Secret field store scenarios, run against each storage backend.

use std::sync::Arc;
use std::thread;

use sysvault::{ErrorKind, MemoryStorage, SecretStorage, UpsertOutcome, VaultConfig};

use crate::common::{fast_config, key, Harness, MODULE, NOTE, PIN, TOKEN, USER};

// ============================================================================
// Scenarios
// ============================================================================

fn round_trip<S: SecretStorage>(h: &Harness<S>) {
    assert_eq!(
        h.fields.upsert(key(1, PIN), "0000").expect("upsert"),
        UpsertOutcome::Created
    );
    assert_eq!(
        h.fields.read(key(1, PIN)).expect("read").as_deref(),
        Some("0000")
    );
    // Unicode survives the trip.
    h.fields.upsert(key(1, TOKEN), "clé-🔑").expect("upsert");
    assert_eq!(
        h.fields.read(key(1, TOKEN)).expect("read").as_deref(),
        Some("clé-🔑")
    );
}

fn blank_writes_are_idempotent<S: SecretStorage>(h: &Harness<S>) {
    for _ in 0..3 {
        assert_eq!(
            h.fields.upsert(key(2, PIN), "").expect("upsert"),
            UpsertOutcome::Unchanged
        );
    }
    assert!(h.storage.get_field(&key(2, PIN)).expect("get").is_none());
}

fn create_then_blank_deletes<S: SecretStorage>(h: &Harness<S>) {
    h.fields.upsert(key(3, PIN), "1234").expect("create");
    assert_eq!(
        h.fields.upsert(key(3, PIN), "").expect("blank"),
        UpsertOutcome::Deleted
    );
    assert!(h.fields.read(key(3, PIN)).expect("read").is_none());
}

fn update_always_rekeys<S: SecretStorage>(h: &Harness<S>) {
    h.fields.upsert(key(4, PIN), "v1").expect("create");
    let first = h.storage.get_field(&key(4, PIN)).expect("get").expect("row");
    h.fields.upsert(key(4, PIN), "v1").expect("update");
    let second = h.storage.get_field(&key(4, PIN)).expect("get").expect("row");

    assert_ne!(first.wrapped_key, second.wrapped_key);
    assert_ne!(first.data, second.data);
    assert_eq!(second.user_id, USER);
}

fn tampering_is_detected<S: SecretStorage>(h: &Harness<S>) {
    h.fields.upsert(key(5, PIN), "secret").expect("create");
    let original = h.storage.get_field(&key(5, PIN)).expect("get").expect("row");

    // Flip one bit in the ciphertext.
    let mut tampered = original.clone();
    tampered.data[14] ^= 0x80;
    h.storage.update_field(&tampered).expect("write");
    assert_eq!(
        h.fields.read(key(5, PIN)).unwrap_err().kind(),
        ErrorKind::Integrity
    );

    // Flip one bit in the wrapped key.
    let mut tampered = original.clone();
    if let Some(wrapped) = tampered.wrapped_key.as_mut() {
        wrapped[20] ^= 0x01;
    }
    h.storage.update_field(&tampered).expect("write");
    assert_eq!(
        h.fields.read(key(5, PIN)).unwrap_err().kind(),
        ErrorKind::Integrity
    );

    // Swap ciphertexts between two fields of the same user.
    h.fields.upsert(key(6, PIN), "other").expect("create");
    let mut moved = h.storage.get_field(&key(6, PIN)).expect("get").expect("row");
    moved.key = key(5, PIN);
    h.storage.update_field(&moved).expect("write");
    assert_eq!(
        h.fields.read(key(5, PIN)).unwrap_err().kind(),
        ErrorKind::Integrity
    );
}

fn item_reads_and_deletes<S: SecretStorage>(h: &Harness<S>) {
    h.fields.upsert(key(20, NOTE), "note").expect("upsert");
    h.fields.upsert(key(20, TOKEN), "token").expect("upsert");
    h.fields.upsert(key(20, PIN), "pin").expect("upsert");
    h.fields.upsert(key(21, PIN), "pin21").expect("upsert");
    h.fields.upsert(key(22, PIN), "pin22").expect("upsert");

    assert_eq!(
        h.fields.read_for_owner(20, MODULE).expect("read item"),
        vec![
            (PIN, "pin".to_string()),
            (TOKEN, "token".to_string()),
            (NOTE, "note".to_string()),
        ]
    );

    assert_eq!(h.fields.delete_for_module(20, MODULE).expect("delete"), 3);
    assert_eq!(h.fields.delete_batch(&[21, 22, 23], MODULE).expect("delete"), 2);
    assert!(h.fields.read_for_owner(20, MODULE).expect("read").is_empty());
}

fn definition_deletes<S: SecretStorage>(h: &Harness<S>) {
    for owner in 30..33 {
        h.fields.upsert(key(owner, PIN), "p").expect("upsert");
        h.fields.upsert(key(owner, NOTE), "n").expect("upsert");
        h.fields.upsert(key(owner, TOKEN), "t").expect("upsert");
    }
    assert_eq!(h.fields.delete_for_definition(NOTE).expect("delete"), 3);
    assert_eq!(
        h.fields
            .delete_batch_for_definitions(&[PIN, TOKEN])
            .expect("delete"),
        6
    );
    assert_eq!(h.fields.delete_batch_for_definitions(&[]).expect("delete"), 0);
    assert!(h.fields.list_all().expect("list").is_empty());
}

fn oversized_wrapped_key_rejected<S: SecretStorage>(storage: Arc<S>) {
    let h = Harness::new(
        storage,
        VaultConfig {
            max_wrapped_key_len: 60,
            ..fast_config()
        },
    );
    let err = h.fields.upsert(key(40, PIN), "x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(h.storage.get_field(&key(40, PIN)).expect("get").is_none());

    // Plain definitions need no key and still work.
    h.fields.upsert(key(40, NOTE), "x").expect("plain upsert");
}

fn run_all<S: SecretStorage>(h: &Harness<S>) {
    round_trip(h);
    blank_writes_are_idempotent(h);
    create_then_blank_deletes(h);
    update_always_rekeys(h);
    tampering_is_detected(h);
    item_reads_and_deletes(h);
}

// ============================================================================
// Memory backend
// ============================================================================

#[test]
fn memory_backend_scenarios() {
    let h = Harness::new(Arc::new(MemoryStorage::new()), fast_config());
    run_all(&h);
}

#[test]
fn memory_backend_definition_deletes() {
    let h = Harness::new(Arc::new(MemoryStorage::new()), fast_config());
    definition_deletes(&h);
}

#[test]
fn memory_backend_rejects_oversized_wrapped_key() {
    oversized_wrapped_key_rejected(Arc::new(MemoryStorage::new()));
}

#[test]
fn concurrent_writes_to_one_field_leave_a_readable_value() {
    let h = Arc::new(Harness::new(Arc::new(MemoryStorage::new()), fast_config()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                for j in 0..10 {
                    h.fields
                        .upsert(key(50, PIN), &format!("writer-{i}-{j}"))
                        .expect("concurrent upsert");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let value = h.fields.read(key(50, PIN)).expect("read").expect("present");
    assert!(value.starts_with("writer-"));
    assert_eq!(h.fields.list_all().expect("list").len(), 1);
}

// ============================================================================
// SQLite backend
// ============================================================================

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use sysvault::SqliteStorage;

    #[test]
    fn sqlite_backend_scenarios() {
        let storage = SqliteStorage::open_in_memory().expect("open in-memory SQLite");
        let h = Harness::new(Arc::new(storage), fast_config());
        run_all(&h);
    }

    #[test]
    fn sqlite_backend_definition_deletes() {
        let storage = SqliteStorage::open_in_memory().expect("open in-memory SQLite");
        let h = Harness::new(Arc::new(storage), fast_config());
        definition_deletes(&h);
    }

    #[test]
    fn sqlite_backend_rejects_oversized_wrapped_key() {
        let storage = SqliteStorage::open_in_memory().expect("open in-memory SQLite");
        oversized_wrapped_key_rejected(Arc::new(storage));
    }
}

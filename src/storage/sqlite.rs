//! SQLite-backed SecretStorage.

use std::cell::RefCell;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::types::{
    DefinitionId, FieldKey, ItemId, MasterKeyParams, MasterPasswordRecord, ModuleId,
    SecretField, UserId, WrappingKeyParams,
};

use super::traits::SecretStorage;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS secret_fields (
    owner_id      INTEGER NOT NULL,
    module_id     INTEGER NOT NULL,
    definition_id INTEGER NOT NULL,
    user_id       INTEGER NOT NULL,
    data          BLOB    NOT NULL,
    wrapped_key   BLOB,
    is_encrypted  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (owner_id, module_id, definition_id)
);
CREATE INDEX IF NOT EXISTS idx_secret_fields_definition ON secret_fields(definition_id);
CREATE INDEX IF NOT EXISTS idx_secret_fields_user ON secret_fields(user_id, is_encrypted);

CREATE TABLE IF NOT EXISTS master_records (
    user_id            INTEGER PRIMARY KEY,
    login_hash         TEXT NOT NULL,
    wrapped_master_key BLOB NOT NULL,
    wrapping_params    TEXT NOT NULL,
    master_key_params  TEXT NOT NULL,
    last_rotated_at    TEXT NOT NULL
);
";

const FIELD_COLUMNS: &str =
    "owner_id, module_id, definition_id, user_id, data, wrapped_key, is_encrypted";

/// Persists fields and master records in one SQLite database.
///
/// The connection sits behind a reentrant lock: a thread running `transaction`
/// keeps other threads out until it commits, while its own nested calls pass.
pub struct SqliteStorage {
    conn: ReentrantMutex<RefCell<Connection>>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        debug!(path = %path.display(), "opened secret store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        f(&*conn)
    }

    fn query_fields(&self, sql: &str, args: &[i64]) -> Result<Vec<SecretField>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), row_to_field)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Run one DELETE over secret_fields with the given WHERE clause.
    fn delete_where(&self, clause: &str, args: &[i64]) -> Result<usize> {
        self.with_conn(|conn| {
            let sql = format!("DELETE FROM secret_fields WHERE {clause}");
            Ok(conn.execute(&sql, params_from_iter(args.iter()))?)
        })
    }
}

fn row_to_field(row: &Row<'_>) -> rusqlite::Result<SecretField> {
    Ok(SecretField {
        key: FieldKey::new(
            row.get::<_, i64>(0)? as ItemId,
            row.get(1)?,
            row.get(2)?,
        ),
        user_id: row.get::<_, i64>(3)? as UserId,
        data: row.get(4)?,
        wrapped_key: row.get(5)?,
        is_encrypted: row.get(6)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// SecretStorage implementation
// ============================================================================

impl SecretStorage for SqliteStorage {
    fn get_field(&self, key: &FieldKey) -> Result<Option<SecretField>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {FIELD_COLUMNS} FROM secret_fields \
                 WHERE owner_id = ?1 AND module_id = ?2 AND definition_id = ?3"
            );
            Ok(conn
                .query_row(
                    &sql,
                    params![key.owner_id as i64, key.module_id, key.definition_id],
                    row_to_field,
                )
                .optional()?)
        })
    }

    fn insert_field(&self, field: &SecretField) -> Result<()> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO secret_fields \
                 (owner_id, module_id, definition_id, user_id, data, wrapped_key, is_encrypted) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    field.key.owner_id as i64,
                    field.key.module_id,
                    field.key.definition_id,
                    field.user_id as i64,
                    field.data,
                    field.wrapped_key,
                    field.is_encrypted,
                ],
            )?;
            if inserted == 0 {
                return Err(StorageError::DuplicateField(field.key).into());
            }
            Ok(())
        })
    }

    fn update_field(&self, field: &SecretField) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE secret_fields \
                 SET user_id = ?4, data = ?5, wrapped_key = ?6, is_encrypted = ?7 \
                 WHERE owner_id = ?1 AND module_id = ?2 AND definition_id = ?3",
                params![
                    field.key.owner_id as i64,
                    field.key.module_id,
                    field.key.definition_id,
                    field.user_id as i64,
                    field.data,
                    field.wrapped_key,
                    field.is_encrypted,
                ],
            )?;
            Ok(updated > 0)
        })
    }

    fn delete_field(&self, key: &FieldKey) -> Result<usize> {
        self.delete_where(
            "owner_id = ? AND module_id = ? AND definition_id = ?",
            &[
                key.owner_id as i64,
                i64::from(key.module_id),
                i64::from(key.definition_id),
            ],
        )
    }

    fn delete_for_owner(&self, owner_id: ItemId, module_id: ModuleId) -> Result<usize> {
        self.delete_where(
            "owner_id = ? AND module_id = ?",
            &[owner_id as i64, i64::from(module_id)],
        )
    }

    fn delete_for_owners(&self, owner_ids: &[ItemId], module_id: ModuleId) -> Result<usize> {
        if owner_ids.is_empty() {
            return Ok(0);
        }
        let mut args = vec![i64::from(module_id)];
        args.extend(owner_ids.iter().map(|id| *id as i64));
        self.delete_where(
            &format!(
                "module_id = ? AND owner_id IN ({})",
                placeholders(owner_ids.len())
            ),
            &args,
        )
    }

    fn delete_for_definition(&self, definition_id: DefinitionId) -> Result<usize> {
        self.delete_where("definition_id = ?", &[i64::from(definition_id)])
    }

    fn delete_for_definitions(&self, definition_ids: &[DefinitionId]) -> Result<usize> {
        if definition_ids.is_empty() {
            return Ok(0);
        }
        let args: Vec<i64> = definition_ids.iter().map(|id| i64::from(*id)).collect();
        self.delete_where(
            &format!("definition_id IN ({})", placeholders(args.len())),
            &args,
        )
    }

    fn fields_for_owner(&self, owner_id: ItemId, module_id: ModuleId) -> Result<Vec<SecretField>> {
        self.query_fields(
            &format!(
                "SELECT {FIELD_COLUMNS} FROM secret_fields \
                 WHERE owner_id = ? AND module_id = ? ORDER BY definition_id"
            ),
            &[owner_id as i64, i64::from(module_id)],
        )
    }

    fn encrypted_fields_for_user(&self, user_id: UserId) -> Result<Vec<SecretField>> {
        self.query_fields(
            &format!(
                "SELECT {FIELD_COLUMNS} FROM secret_fields \
                 WHERE user_id = ? AND is_encrypted = 1 \
                 ORDER BY owner_id, module_id, definition_id"
            ),
            &[user_id as i64],
        )
    }

    fn all_fields(&self) -> Result<Vec<SecretField>> {
        self.query_fields(
            &format!(
                "SELECT {FIELD_COLUMNS} FROM secret_fields \
                 ORDER BY owner_id, module_id, definition_id"
            ),
            &[],
        )
    }

    fn get_master_record(&self, user_id: UserId) -> Result<Option<MasterPasswordRecord>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT login_hash, wrapped_master_key, wrapping_params, master_key_params, \
                     last_rotated_at FROM master_records WHERE user_id = ?1",
                    params![user_id as i64],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        let Some((login_hash, wrapped_master_key, wrapping_json, master_key_json, rotated_at)) = row
        else {
            return Ok(None);
        };
        let wrapping: WrappingKeyParams = serde_json::from_str(&wrapping_json)?;
        let master_key: MasterKeyParams = serde_json::from_str(&master_key_json)?;
        let last_rotated_at = DateTime::parse_from_rfc3339(&rotated_at)
            .map_err(|e| {
                StorageError::CorruptRow(format!(
                    "master_records.last_rotated_at for user {user_id}: {e}"
                ))
            })?
            .with_timezone(&Utc);

        Ok(Some(MasterPasswordRecord {
            user_id,
            login_hash,
            wrapped_master_key,
            wrapping,
            master_key,
            last_rotated_at,
        }))
    }

    fn put_master_record(&self, record: &MasterPasswordRecord) -> Result<()> {
        let wrapping_json = serde_json::to_string(&record.wrapping)?;
        let master_key_json = serde_json::to_string(&record.master_key)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO master_records \
                 (user_id, login_hash, wrapped_master_key, wrapping_params, master_key_params, \
                 last_rotated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(user_id) DO UPDATE SET \
                 login_hash = excluded.login_hash, \
                 wrapped_master_key = excluded.wrapped_master_key, \
                 wrapping_params = excluded.wrapping_params, \
                 master_key_params = excluded.master_key_params, \
                 last_rotated_at = excluded.last_rotated_at",
                params![
                    record.user_id as i64,
                    record.login_hash,
                    record.wrapped_master_key,
                    wrapping_json,
                    master_key_json,
                    record.last_rotated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let guard = self.conn.lock();
        {
            let conn = guard.borrow();
            if !conn.is_autocommit() {
                return Err(StorageError::Transaction {
                    message: "nested transactions are not supported in SqliteStorage".to_string(),
                    source: None,
                }
                .into());
            }
            conn.execute_batch("BEGIN IMMEDIATE")?;
        }

        let result = f(self).and_then(|value| {
            guard
                .borrow()
                .execute_batch("COMMIT")
                .map_err(|e| StorageError::Transaction {
                    message: "commit failed".to_string(),
                    source: Some(Box::new(e)),
                })?;
            Ok(value)
        });

        // A failed COMMIT leaves the transaction open; close it either way.
        if result.is_err() && !guard.borrow().is_autocommit() {
            if let Err(rollback_err) = guard.borrow().execute_batch("ROLLBACK") {
                debug!(error = %rollback_err, "rollback failed");
            }
        }
        result
    }
}

//! In-memory SecretStorage.
//!
//! Transactions buffer writes in a side map that is merged into the main maps
//! on commit and discarded on rollback. A reentrant gate serializes callers:
//! the thread that owns a transaction re-enters freely, everyone else waits
//! until it commits or rolls back, so no other caller ever observes the buffer.

use std::collections::{BTreeMap, HashMap};

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::{Result, StorageError};
use crate::types::{
    DefinitionId, FieldKey, ItemId, MasterPasswordRecord, ModuleId, SecretField, UserId,
};

use super::traits::SecretStorage;

/// Transaction buffer for fields: key → Option<field>, None = delete.
type TxFieldBuffer = BTreeMap<FieldKey, Option<SecretField>>;

#[derive(Default)]
pub struct MemoryStorage {
    gate: ReentrantMutex<()>,
    fields: Mutex<BTreeMap<FieldKey, SecretField>>,
    masters: Mutex<HashMap<UserId, MasterPasswordRecord>>,
    tx_fields: Mutex<Option<TxFieldBuffer>>,
    tx_masters: Mutex<Option<HashMap<UserId, MasterPasswordRecord>>>,
}

/// Discards transaction buffers unless they were taken by a commit.
struct TxReset<'a>(&'a MemoryStorage);

impl Drop for TxReset<'_> {
    fn drop(&mut self) {
        *self.0.tx_fields.lock() = None;
        *self.0.tx_masters.lock() = None;
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn in_transaction(&self) -> bool {
        self.tx_fields.lock().is_some()
    }

    /// Get a field, checking the tx buffer first then the main store.
    fn lookup(&self, key: &FieldKey) -> Option<SecretField> {
        let tx = self.tx_fields.lock();
        if let Some(ref tx_map) = *tx {
            if let Some(entry) = tx_map.get(key) {
                return entry.clone(); // None = deleted in tx
            }
        }
        self.fields.lock().get(key).cloned()
    }

    /// All fields, merging the tx buffer over the main store, ordered by key.
    fn merged_fields(&self) -> Vec<SecretField> {
        let tx = self.tx_fields.lock();
        let mut merged = self.fields.lock().clone();
        if let Some(ref tx_map) = *tx {
            for (key, entry) in tx_map {
                match entry {
                    Some(field) => {
                        merged.insert(*key, field.clone());
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }
        merged.into_values().collect()
    }

    fn write(&self, field: SecretField) {
        let mut tx = self.tx_fields.lock();
        if let Some(ref mut tx_map) = *tx {
            tx_map.insert(field.key, Some(field));
        } else {
            drop(tx);
            self.fields.lock().insert(field.key, field);
        }
    }

    /// Remove every field matching `predicate`. Returns the number removed.
    fn remove_where(&self, predicate: impl Fn(&FieldKey) -> bool) -> usize {
        let _gate = self.gate.lock();
        let doomed: Vec<FieldKey> = self
            .merged_fields()
            .into_iter()
            .map(|f| f.key)
            .filter(|k| predicate(k))
            .collect();

        let mut tx = self.tx_fields.lock();
        if let Some(ref mut tx_map) = *tx {
            for key in &doomed {
                tx_map.insert(*key, None);
            }
        } else {
            drop(tx);
            let mut fields = self.fields.lock();
            for key in &doomed {
                fields.remove(key);
            }
        }
        doomed.len()
    }
}

// ============================================================================
// SecretStorage implementation
// ============================================================================

impl SecretStorage for MemoryStorage {
    fn get_field(&self, key: &FieldKey) -> Result<Option<SecretField>> {
        let _gate = self.gate.lock();
        Ok(self.lookup(key))
    }

    fn insert_field(&self, field: &SecretField) -> Result<()> {
        let _gate = self.gate.lock();
        if self.lookup(&field.key).is_some() {
            return Err(StorageError::DuplicateField(field.key).into());
        }
        self.write(field.clone());
        Ok(())
    }

    fn update_field(&self, field: &SecretField) -> Result<bool> {
        let _gate = self.gate.lock();
        if self.lookup(&field.key).is_none() {
            return Ok(false);
        }
        self.write(field.clone());
        Ok(true)
    }

    fn delete_field(&self, key: &FieldKey) -> Result<usize> {
        Ok(self.remove_where(|k| k == key))
    }

    fn delete_for_owner(&self, owner_id: ItemId, module_id: ModuleId) -> Result<usize> {
        Ok(self.remove_where(|k| k.owner_id == owner_id && k.module_id == module_id))
    }

    fn delete_for_owners(&self, owner_ids: &[ItemId], module_id: ModuleId) -> Result<usize> {
        Ok(self.remove_where(|k| k.module_id == module_id && owner_ids.contains(&k.owner_id)))
    }

    fn delete_for_definition(&self, definition_id: DefinitionId) -> Result<usize> {
        Ok(self.remove_where(|k| k.definition_id == definition_id))
    }

    fn delete_for_definitions(&self, definition_ids: &[DefinitionId]) -> Result<usize> {
        Ok(self.remove_where(|k| definition_ids.contains(&k.definition_id)))
    }

    fn fields_for_owner(&self, owner_id: ItemId, module_id: ModuleId) -> Result<Vec<SecretField>> {
        let _gate = self.gate.lock();
        Ok(self
            .merged_fields()
            .into_iter()
            .filter(|f| f.key.owner_id == owner_id && f.key.module_id == module_id)
            .collect())
    }

    fn encrypted_fields_for_user(&self, user_id: UserId) -> Result<Vec<SecretField>> {
        let _gate = self.gate.lock();
        Ok(self
            .merged_fields()
            .into_iter()
            .filter(|f| f.is_encrypted && f.user_id == user_id)
            .collect())
    }

    fn all_fields(&self) -> Result<Vec<SecretField>> {
        let _gate = self.gate.lock();
        Ok(self.merged_fields())
    }

    fn get_master_record(&self, user_id: UserId) -> Result<Option<MasterPasswordRecord>> {
        let _gate = self.gate.lock();
        let tx = self.tx_masters.lock();
        if let Some(record) = tx.as_ref().and_then(|m| m.get(&user_id)) {
            return Ok(Some(record.clone()));
        }
        Ok(self.masters.lock().get(&user_id).cloned())
    }

    fn put_master_record(&self, record: &MasterPasswordRecord) -> Result<()> {
        let _gate = self.gate.lock();
        let mut tx = self.tx_masters.lock();
        if let Some(ref mut tx_map) = *tx {
            tx_map.insert(record.user_id, record.clone());
        } else {
            drop(tx);
            self.masters.lock().insert(record.user_id, record.clone());
        }
        Ok(())
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let _gate = self.gate.lock();

        // Guard against nested transactions (not supported)
        if self.in_transaction() {
            return Err(StorageError::Transaction {
                message: "nested transactions are not supported in MemoryStorage".to_string(),
                source: None,
            }
            .into());
        }

        *self.tx_fields.lock() = Some(BTreeMap::new());
        *self.tx_masters.lock() = Some(HashMap::new());
        let reset = TxReset(self);

        let value = f(self)?;

        // Commit: merge buffers into the main store
        let field_buf = self.tx_fields.lock().take();
        let master_buf = self.tx_masters.lock().take();
        if let Some(field_map) = field_buf {
            let mut fields = self.fields.lock();
            for (key, entry) in field_map {
                match entry {
                    Some(field) => {
                        fields.insert(key, field);
                    }
                    None => {
                        fields.remove(&key);
                    }
                }
            }
        }
        if let Some(master_map) = master_buf {
            self.masters.lock().extend(master_map);
        }
        drop(reset);

        Ok(value)
    }
}

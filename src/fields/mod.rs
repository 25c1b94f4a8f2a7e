//! Secret field store.
//!
//! Each (owner, module, definition) triple moves between `Absent` and either
//! `Encrypted` or `Plain`. A blank value means "no value": writing it deletes
//! the record, and writing it to an absent field does nothing.
//!
//! Every write re-reads the field's definition, since a definition can switch
//! between encrypted and plain at any time, and always draws a fresh per-secret
//! key for encrypted values.
//!
//! Reads and writes hold the shared side of the session user's lock, so they
//! never observe a rotation half way: a row and the key that opens it always
//! come from the same side of the commit.

pub mod codec;

use std::sync::Arc;

use sysvault_crypto::MasterKey;
use tracing::debug;

use crate::config::VaultConfig;
use crate::definitions::DefinitionLookup;
use crate::error::{Result, VaultError};
use crate::locks::LockRegistry;
use crate::session::{current_master_key, SessionKeyProvider};
use crate::storage::SecretStorage;
use crate::types::{DefinitionId, FieldKey, ItemId, ModuleId, SecretField, UserId};

pub use codec::{open_field, plain_field, plain_value, seal_field};

/// What an `upsert` did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Deleted,
    /// Blank value written to an absent field.
    Unchanged,
}

pub struct SecretFieldStore<S, D> {
    storage: Arc<S>,
    definitions: Arc<D>,
    session: Arc<dyn SessionKeyProvider>,
    locks: Arc<LockRegistry>,
    config: Arc<VaultConfig>,
}

impl<S: SecretStorage, D: DefinitionLookup> SecretFieldStore<S, D> {
    pub fn new(
        storage: Arc<S>,
        definitions: Arc<D>,
        session: Arc<dyn SessionKeyProvider>,
        locks: Arc<LockRegistry>,
        config: Arc<VaultConfig>,
    ) -> Self {
        Self {
            storage,
            definitions,
            session,
            locks,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Create, replace or delete the value of one field.
    pub fn upsert(&self, key: FieldKey, value: &str) -> Result<UpsertOutcome> {
        let user_id = self.session.user_id();
        let _guard = self.locks.field_write(user_id, key);

        let outcome = self.storage.transaction(|tx| {
            let exists = tx.field_exists(&key)?;
            if value.is_empty() {
                if exists {
                    tx.delete_field(&key)?;
                    return Ok(UpsertOutcome::Deleted);
                }
                return Ok(UpsertOutcome::Unchanged);
            }

            let field = self.build_field(tx, key, user_id, value)?;
            if exists {
                tx.update_field(&field)?;
                Ok(UpsertOutcome::Updated)
            } else {
                tx.insert_field(&field)?;
                Ok(UpsertOutcome::Created)
            }
        })?;

        debug!(
            owner_id = key.owner_id,
            module_id = key.module_id,
            definition_id = key.definition_id,
            outcome = ?outcome,
            "upserted secret field"
        );
        Ok(outcome)
    }

    /// Store a value for a field that must not exist yet.
    ///
    /// A blank value is accepted without writing anything; returns whether a
    /// record was written.
    pub fn create(&self, key: FieldKey, value: &str) -> Result<bool> {
        if value.is_empty() {
            return Ok(false);
        }
        let user_id = self.session.user_id();
        let _guard = self.locks.field_write(user_id, key);

        let field = self.storage.transaction(|tx| {
            let field = self.build_field(tx, key, user_id, value)?;
            tx.insert_field(&field)?;
            Ok(field)
        })?;
        debug!(
            owner_id = key.owner_id,
            module_id = key.module_id,
            definition_id = key.definition_id,
            encrypted = field.is_encrypted,
            "created secret field"
        );
        Ok(true)
    }

    fn build_field(
        &self,
        tx: &S,
        key: FieldKey,
        user_id: UserId,
        value: &str,
    ) -> Result<SecretField> {
        let definition = self.definitions.get_definition(key.definition_id)?;
        if !definition.is_encrypted {
            return Ok(plain_field(key, user_id, value));
        }
        let master_key = current_master_key(self.session.as_ref(), tx)?;
        seal_field(
            key,
            user_id,
            value.as_bytes(),
            &master_key,
            self.config.max_wrapped_key_len,
        )
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The field's value, or `None` if no record exists.
    pub fn read(&self, key: FieldKey) -> Result<Option<String>> {
        let _shared = self.locks.user_shared(self.session.user_id());
        let Some(field) = self.storage.get_field(&key)? else {
            return Ok(None);
        };
        let master_key = self.key_for(std::slice::from_ref(&field))?;
        self.decode(&field, master_key.as_ref()).map(Some)
    }

    /// All values of one item in one module, ordered by definition id.
    pub fn read_for_owner(
        &self,
        owner_id: ItemId,
        module_id: ModuleId,
    ) -> Result<Vec<(DefinitionId, String)>> {
        let _shared = self.locks.user_shared(self.session.user_id());
        let fields = self.storage.fields_for_owner(owner_id, module_id)?;
        let master_key = self.key_for(&fields)?;
        fields
            .iter()
            .map(|field| {
                self.decode(field, master_key.as_ref())
                    .map(|value| (field.key.definition_id, value))
            })
            .collect()
    }

    /// The checked session key, if any of `fields` needs one to decode.
    fn key_for(&self, fields: &[SecretField]) -> Result<Option<MasterKey>> {
        if !fields.iter().any(needs_key) {
            return Ok(None);
        }
        current_master_key(self.session.as_ref(), self.storage.as_ref()).map(Some)
    }

    fn decode(&self, field: &SecretField, master_key: Option<&MasterKey>) -> Result<String> {
        if !needs_key(field) {
            return if field.data.is_empty() {
                Ok(String::new())
            } else {
                plain_value(field)
            };
        }
        let master_key = master_key.ok_or(VaultError::SessionLocked)?;
        open_field(field, master_key, self.config.max_wrapped_key_len)
    }

    /// Raw records, still encrypted.
    pub fn list_all(&self) -> Result<Vec<SecretField>> {
        self.storage.all_fields()
    }

    /// Raw encrypted records whose keys are wrapped by `user_id`.
    pub fn list_encrypted(&self, user_id: UserId) -> Result<Vec<SecretField>> {
        self.storage.encrypted_fields_for_user(user_id)
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    pub fn delete(&self, key: FieldKey) -> Result<usize> {
        let _guard = self.locks.field_write(self.session.user_id(), key);
        let removed = self.storage.delete_field(&key)?;
        debug!(
            owner_id = key.owner_id,
            module_id = key.module_id,
            definition_id = key.definition_id,
            removed,
            "deleted secret field"
        );
        Ok(removed)
    }

    /// Delete every field of an item in one module.
    pub fn delete_for_module(&self, owner_id: ItemId, module_id: ModuleId) -> Result<usize> {
        let removed = self.storage.delete_for_owner(owner_id, module_id)?;
        debug!(owner_id, module_id, removed, "deleted item secret fields");
        Ok(removed)
    }

    /// Delete every field of several items in one module.
    pub fn delete_batch(&self, owner_ids: &[ItemId], module_id: ModuleId) -> Result<usize> {
        let removed = self.storage.delete_for_owners(owner_ids, module_id)?;
        debug!(
            items = owner_ids.len(),
            module_id, removed, "deleted secret fields for items"
        );
        Ok(removed)
    }

    pub fn delete_for_definition(&self, definition_id: DefinitionId) -> Result<usize> {
        let removed = self.storage.delete_for_definition(definition_id)?;
        debug!(definition_id, removed, "deleted secret fields for definition");
        Ok(removed)
    }

    pub fn delete_batch_for_definitions(&self, definition_ids: &[DefinitionId]) -> Result<usize> {
        let removed = self.storage.delete_for_definitions(definition_ids)?;
        debug!(
            definitions = definition_ids.len(),
            removed, "deleted secret fields for definitions"
        );
        Ok(removed)
    }
}

fn needs_key(field: &SecretField) -> bool {
    field.is_encrypted && !field.data.is_empty()
}

//! Storage collaborator contract.

use crate::error::Result;
use crate::types::{
    DefinitionId, FieldKey, ItemId, MasterPasswordRecord, ModuleId, SecretField, UserId,
};

/// Persistence for secret fields and master-password records.
///
/// Every bulk operation is atomic on its own. `transaction` groups several calls:
/// all writes made through the handle passed to `f` commit together when `f`
/// returns `Ok`, and none of them are visible if it returns `Err`.
pub trait SecretStorage: Send + Sync {
    // -----------------------------------------------------------------------
    // Secret fields
    // -----------------------------------------------------------------------

    fn get_field(&self, key: &FieldKey) -> Result<Option<SecretField>>;

    fn field_exists(&self, key: &FieldKey) -> Result<bool> {
        Ok(self.get_field(key)?.is_some())
    }

    /// Insert a new field. Fails with `StorageError::DuplicateField` if present.
    fn insert_field(&self, field: &SecretField) -> Result<()>;

    /// Replace an existing field. Returns `false` if no row matched.
    fn update_field(&self, field: &SecretField) -> Result<bool>;

    fn delete_field(&self, key: &FieldKey) -> Result<usize>;

    /// Delete every field of one item in one module.
    fn delete_for_owner(&self, owner_id: ItemId, module_id: ModuleId) -> Result<usize>;

    /// Delete every field of several items in one module.
    fn delete_for_owners(&self, owner_ids: &[ItemId], module_id: ModuleId) -> Result<usize>;

    fn delete_for_definition(&self, definition_id: DefinitionId) -> Result<usize>;

    fn delete_for_definitions(&self, definition_ids: &[DefinitionId]) -> Result<usize>;

    /// Fields of one item in one module, ordered by definition id.
    fn fields_for_owner(&self, owner_id: ItemId, module_id: ModuleId) -> Result<Vec<SecretField>>;

    /// Encrypted fields whose key is wrapped by `user_id`'s master key.
    fn encrypted_fields_for_user(&self, user_id: UserId) -> Result<Vec<SecretField>>;

    /// Every stored field, ordered by key.
    fn all_fields(&self) -> Result<Vec<SecretField>>;

    // -----------------------------------------------------------------------
    // Master-password records
    // -----------------------------------------------------------------------

    fn get_master_record(&self, user_id: UserId) -> Result<Option<MasterPasswordRecord>>;

    /// Insert or replace a user's record.
    fn put_master_record(&self, record: &MasterPasswordRecord) -> Result<()>;

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
        Self: Sized;
}

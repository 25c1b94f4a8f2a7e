//! Shared fixtures for the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sysvault::{
    DefinitionId, DefinitionRegistry, FieldDefinition, FieldKey, ItemId, KdfParams,
    LockRegistry, MasterKeyRotation, MasterPasswordRecord, MasterPasswordService, ModuleId,
    Result, SecretField, SecretFieldStore, SecretStorage, Session, SessionKeyProvider,
    StorageError, UserId, VaultConfig,
};

pub const USER: UserId = 3;
pub const PASSWORD: &str = "correct horse battery staple";
pub const MATERIAL: &[u8] = b"initial master material";

pub const MODULE: ModuleId = 1;
pub const PIN: DefinitionId = 10;
pub const TOKEN: DefinitionId = 11;
pub const NOTE: DefinitionId = 12;

pub fn fast_config() -> VaultConfig {
    VaultConfig {
        kdf: KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        ..VaultConfig::default()
    }
}

fn definition(id: DefinitionId, name: &str, is_encrypted: bool) -> FieldDefinition {
    FieldDefinition {
        id,
        module_id: MODULE,
        name: name.to_string(),
        is_encrypted,
    }
}

/// One user with an unlocked session, wired to every service.
pub struct Harness<S: SecretStorage> {
    pub storage: Arc<S>,
    pub definitions: Arc<DefinitionRegistry>,
    pub locks: Arc<LockRegistry>,
    pub config: Arc<VaultConfig>,
    pub session: Arc<Session>,
    pub users: MasterPasswordService<S>,
    pub fields: SecretFieldStore<S, DefinitionRegistry>,
    pub rotation: MasterKeyRotation<S>,
}

impl<S: SecretStorage> Harness<S> {
    /// Create the user's record, log in, and wire services.
    pub fn new(storage: Arc<S>, config: VaultConfig) -> Self {
        let config = Arc::new(config);
        let locks = Arc::new(LockRegistry::new());
        let users = MasterPasswordService::new(
            Arc::clone(&storage),
            Arc::clone(&locks),
            Arc::clone(&config),
        );
        users
            .create_with_master_pass(USER, PASSWORD, MATERIAL)
            .expect("create user");
        Self::login(storage, config, locks, users)
    }

    /// Log in an existing user against already-populated storage.
    pub fn existing(storage: Arc<S>, config: VaultConfig) -> Self {
        let config = Arc::new(config);
        let locks = Arc::new(LockRegistry::new());
        let users = MasterPasswordService::new(
            Arc::clone(&storage),
            Arc::clone(&locks),
            Arc::clone(&config),
        );
        Self::login(storage, config, locks, users)
    }

    fn login(
        storage: Arc<S>,
        config: Arc<VaultConfig>,
        locks: Arc<LockRegistry>,
        users: MasterPasswordService<S>,
    ) -> Self {
        let definitions = Arc::new(DefinitionRegistry::new());
        definitions.register(definition(PIN, "PIN", true));
        definitions.register(definition(TOKEN, "API Token", true));
        definitions.register(definition(NOTE, "Note", false));

        let session = Arc::new(users.authenticate(USER, PASSWORD).expect("authenticate"));
        let provider = Arc::clone(&session) as Arc<dyn SessionKeyProvider>;

        Self {
            fields: SecretFieldStore::new(
                Arc::clone(&storage),
                Arc::clone(&definitions),
                Arc::clone(&provider),
                Arc::clone(&locks),
                Arc::clone(&config),
            ),
            rotation: MasterKeyRotation::new(
                Arc::clone(&storage),
                provider,
                Arc::clone(&locks),
                Arc::clone(&config),
            ),
            storage,
            definitions,
            locks,
            config,
            session,
            users,
        }
    }

    /// A field store bound to another session over the same storage.
    pub fn store_for(&self, session: Arc<Session>) -> SecretFieldStore<S, DefinitionRegistry> {
        SecretFieldStore::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.definitions),
            session,
            Arc::clone(&self.locks),
            Arc::clone(&self.config),
        )
    }

    pub fn master_record(&self) -> MasterPasswordRecord {
        self.storage
            .get_master_record(USER)
            .expect("get master record")
            .expect("master record exists")
    }
}

pub fn key(owner: ItemId, definition: DefinitionId) -> FieldKey {
    FieldKey::new(owner, MODULE, definition)
}

// ============================================================================
// Fault injection
// ============================================================================

/// Storage wrapper whose Nth `update_field` call fails.
pub struct FailingStorage<S> {
    inner: S,
    fail_on_update: AtomicUsize,
    updates: AtomicUsize,
}

impl<S: SecretStorage> FailingStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_on_update: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    /// Fail the `n`th update from now on (1-based). 0 disables.
    pub fn fail_update(&self, n: usize) {
        self.updates.store(0, Ordering::SeqCst);
        self.fail_on_update.store(n, Ordering::SeqCst);
    }
}

impl<S: SecretStorage> SecretStorage for FailingStorage<S> {
    fn get_field(&self, key: &FieldKey) -> Result<Option<SecretField>> {
        self.inner.get_field(key)
    }

    fn insert_field(&self, field: &SecretField) -> Result<()> {
        self.inner.insert_field(field)
    }

    fn update_field(&self, field: &SecretField) -> Result<bool> {
        let n = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on_update.load(Ordering::SeqCst) {
            return Err(StorageError::Transaction {
                message: format!("injected failure on update #{n}"),
                source: None,
            }
            .into());
        }
        self.inner.update_field(field)
    }

    fn delete_field(&self, key: &FieldKey) -> Result<usize> {
        self.inner.delete_field(key)
    }

    fn delete_for_owner(&self, owner_id: ItemId, module_id: ModuleId) -> Result<usize> {
        self.inner.delete_for_owner(owner_id, module_id)
    }

    fn delete_for_owners(&self, owner_ids: &[ItemId], module_id: ModuleId) -> Result<usize> {
        self.inner.delete_for_owners(owner_ids, module_id)
    }

    fn delete_for_definition(&self, definition_id: DefinitionId) -> Result<usize> {
        self.inner.delete_for_definition(definition_id)
    }

    fn delete_for_definitions(&self, definition_ids: &[DefinitionId]) -> Result<usize> {
        self.inner.delete_for_definitions(definition_ids)
    }

    fn fields_for_owner(&self, owner_id: ItemId, module_id: ModuleId) -> Result<Vec<SecretField>> {
        self.inner.fields_for_owner(owner_id, module_id)
    }

    fn encrypted_fields_for_user(&self, user_id: UserId) -> Result<Vec<SecretField>> {
        self.inner.encrypted_fields_for_user(user_id)
    }

    fn all_fields(&self) -> Result<Vec<SecretField>> {
        self.inner.all_fields()
    }

    fn get_master_record(&self, user_id: UserId) -> Result<Option<MasterPasswordRecord>> {
        self.inner.get_master_record(user_id)
    }

    fn put_master_record(&self, record: &MasterPasswordRecord) -> Result<()> {
        self.inner.put_master_record(record)
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.inner.transaction(|_| f(self))
    }
}

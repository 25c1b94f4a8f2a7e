//! Secret field encryption engine: per-secret keys wrapped by a session master key,
//! secret field storage, and transactional master-key rotation.

pub mod config;
pub mod definitions;
pub mod error;
pub mod fields;
pub mod locks;
pub mod rotation;
mod serde_base64;
pub mod session;
pub mod storage;
pub mod types;
pub mod users;

pub use config::VaultConfig;
pub use definitions::{form_id_for_name, DefinitionLookup, DefinitionRegistry};
pub use error::{ErrorKind, Result, StorageError, VaultError};
pub use fields::{SecretFieldStore, UpsertOutcome};
pub use locks::LockRegistry;
pub use rotation::{MasterKeyRotation, RotationReport};
pub use session::{Session, SessionKeyProvider};
pub use storage::{MemoryStorage, SecretStorage};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;
pub use types::{
    DefinitionId, FieldDefinition, FieldKey, ItemId, MasterKeyParams, MasterPasswordRecord,
    ModuleId, SecretField, UserId, WrappingKeyParams,
};
pub use users::MasterPasswordService;

pub use sysvault_crypto::{KdfParams, MasterKey};

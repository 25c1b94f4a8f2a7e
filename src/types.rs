//! Core records: secret fields, field definitions, master-password records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysvault_crypto::{CryptoError, EncryptionContext, KdfParams, MasterKey};

pub type UserId = u64;
pub type ItemId = u64;
pub type ModuleId = u32;
pub type DefinitionId = u32;

// ============================================================================
// FieldKey / SecretField
// ============================================================================

/// Unique address of a secret field: one per (owner item, module, definition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    pub owner_id: ItemId,
    pub module_id: ModuleId,
    pub definition_id: DefinitionId,
}

impl FieldKey {
    pub fn new(owner_id: ItemId, module_id: ModuleId, definition_id: DefinitionId) -> Self {
        Self {
            owner_id,
            module_id,
            definition_id,
        }
    }

    /// AAD context binding a ciphertext to this field.
    pub fn encryption_context(&self) -> EncryptionContext {
        EncryptionContext::new(
            format!("field:{}:{}", self.module_id, self.definition_id),
            self.owner_id.to_string(),
        )
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "owner={} module={} definition={}",
            self.owner_id, self.module_id, self.definition_id
        )
    }
}

/// A stored field value.
///
/// Encrypted fields hold `data = ciphertext` and the per-secret key wrapped under
/// the master key of `user_id`. Plain fields hold the UTF-8 value and no key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretField {
    pub key: FieldKey,
    /// User whose master key wraps `wrapped_key`.
    pub user_id: UserId,
    pub data: Vec<u8>,
    pub wrapped_key: Option<Vec<u8>>,
    pub is_encrypted: bool,
}

impl fmt::Debug for SecretField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretField")
            .field("key", &self.key)
            .field("user_id", &self.user_id)
            .field("data_len", &self.data.len())
            .field("has_wrapped_key", &self.wrapped_key.is_some())
            .field("is_encrypted", &self.is_encrypted)
            .finish()
    }
}

// ============================================================================
// FieldDefinition
// ============================================================================

/// Definition of a custom field. `is_encrypted` decides how its values are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: DefinitionId,
    pub module_id: ModuleId,
    pub name: String,
    pub is_encrypted: bool,
}

// ============================================================================
// MasterPasswordRecord
// ============================================================================

/// Parameters for deriving the key that unlocks a user's wrapped master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappingKeyParams {
    #[serde(with = "crate::serde_base64")]
    pub salt: Vec<u8>,
    pub kdf: KdfParams,
}

/// How the current master key was derived from its material, and the check
/// value a session key must match to write under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeyParams {
    #[serde(with = "crate::serde_base64")]
    pub salt: Vec<u8>,
    pub kdf: KdfParams,
    /// `MasterKey::fingerprint` of the current master key.
    #[serde(with = "crate::serde_base64")]
    pub fingerprint: Vec<u8>,
}

impl MasterKeyParams {
    pub fn matches(&self, key: &MasterKey) -> Result<bool, CryptoError> {
        Ok(key.fingerprint()?[..] == self.fingerprint[..])
    }
}

/// Per-user master password state.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterPasswordRecord {
    pub user_id: UserId,
    /// Argon2id PHC hash of the login password.
    pub login_hash: String,
    /// Master key wrapped under the password-derived unlock key.
    pub wrapped_master_key: Vec<u8>,
    pub wrapping: WrappingKeyParams,
    pub master_key: MasterKeyParams,
    pub last_rotated_at: DateTime<Utc>,
}

impl MasterPasswordRecord {
    /// AAD context for the wrapped master key.
    pub fn encryption_context(user_id: UserId) -> EncryptionContext {
        EncryptionContext::new("master-key", user_id.to_string())
    }
}

impl fmt::Debug for MasterPasswordRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterPasswordRecord")
            .field("user_id", &self.user_id)
            .field("wrapping", &self.wrapping)
            .field("master_key", &self.master_key)
            .field("last_rotated_at", &self.last_rotated_at)
            .finish_non_exhaustive()
    }
}

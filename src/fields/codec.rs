//! Sealing and opening of individual field values.
//!
//! Shared by the field store and master-key rotation, so a re-keyed field is
//! written exactly the way a fresh one is.

use sysvault_crypto::{check_wrapped_key_len, make_wrapped_key, open, seal, MasterKey};

use crate::error::{Result, VaultError};
use crate::types::{FieldKey, SecretField, UserId};

/// Encrypt `value` under a fresh per-secret key wrapped by `master_key`.
///
/// The wrapped key is checked against `max_wrapped_key_len` before anything is
/// returned, so an oversized key never reaches storage.
pub fn seal_field(
    key: FieldKey,
    user_id: UserId,
    value: &[u8],
    master_key: &MasterKey,
    max_wrapped_key_len: usize,
) -> Result<SecretField> {
    let wrapped_key = make_wrapped_key(master_key.as_bytes())?;
    check_wrapped_key_len(&wrapped_key, max_wrapped_key_len)?;
    let data = seal(
        value,
        &wrapped_key,
        master_key.as_bytes(),
        Some(&key.encryption_context()),
    )?;
    Ok(SecretField {
        key,
        user_id,
        data,
        wrapped_key: Some(wrapped_key),
        is_encrypted: true,
    })
}

/// A plaintext field record.
pub fn plain_field(key: FieldKey, user_id: UserId, value: &str) -> SecretField {
    SecretField {
        key,
        user_id,
        data: value.as_bytes().to_vec(),
        wrapped_key: None,
        is_encrypted: false,
    }
}

/// Decrypt an encrypted field with `master_key`.
///
/// Empty data opens to `""` without touching the key. Anything else is always
/// decrypted; a missing or stale key surfaces as an integrity error.
pub fn open_field(
    field: &SecretField,
    master_key: &MasterKey,
    max_wrapped_key_len: usize,
) -> Result<String> {
    if field.data.is_empty() {
        return Ok(String::new());
    }
    let wrapped_key = field
        .wrapped_key
        .as_deref()
        .ok_or(VaultError::MissingWrappedKey(field.key))?;
    check_wrapped_key_len(wrapped_key, max_wrapped_key_len)?;
    let plaintext = open(
        &field.data,
        wrapped_key,
        master_key.as_bytes(),
        Some(&field.key.encryption_context()),
    )?;
    String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::InvalidUtf8(field.key))
}

/// Read a plaintext field's value.
pub fn plain_value(field: &SecretField) -> Result<String> {
    String::from_utf8(field.data.clone()).map_err(|_| VaultError::InvalidUtf8(field.key))
}

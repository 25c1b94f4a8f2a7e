//! Session master-key holder.
//!
//! A `Session` holds one user's master key for as long as the user is logged
//! in. The key is never persisted or logged; closing the session drops it and
//! the underlying buffer is zeroized.

use parking_lot::RwLock;
use sysvault_crypto::{
    decrypt, derive_key_from_password, encrypt, generate_salt, KdfParams, MasterKey,
};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};
use crate::storage::SecretStorage;
use crate::types::{MasterKeyParams, MasterPasswordRecord, UserId, WrappingKeyParams};

/// Source of the current user's master key.
pub trait SessionKeyProvider: Send + Sync {
    fn user_id(&self) -> UserId;

    /// The master key, or `VaultError::SessionLocked` if none is loaded.
    fn session_key(&self) -> Result<MasterKey>;

    /// Swap in a new master key after a rotation commits.
    fn replace_key(&self, key: MasterKey);
}

pub struct Session {
    user_id: UserId,
    key: RwLock<Option<MasterKey>>,
}

impl Session {
    pub fn from_master_key(user_id: UserId, key: MasterKey) -> Self {
        Self {
            user_id,
            key: RwLock::new(Some(key)),
        }
    }

    /// A session with no key loaded. Every key request fails until `replace_key`.
    pub fn locked(user_id: UserId) -> Self {
        Self {
            user_id,
            key: RwLock::new(None),
        }
    }

    /// Unwrap the record's master key with a password-derived unlock key.
    ///
    /// Does not check the login hash; callers authenticate first.
    pub fn unlock(record: &MasterPasswordRecord, password: &str) -> Result<Self> {
        let key = open_master_key(record, password)?;
        Ok(Self::from_master_key(record.user_id, key))
    }

    /// Forget the master key.
    pub fn close(&self) {
        self.key.write().take();
    }

    pub fn is_open(&self) -> bool {
        self.key.read().is_some()
    }
}

impl SessionKeyProvider for Session {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn session_key(&self) -> Result<MasterKey> {
        self.key.read().clone().ok_or(VaultError::SessionLocked)
    }

    fn replace_key(&self, key: MasterKey) {
        *self.key.write() = Some(key);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// The session's master key, checked against the user's stored record.
///
/// A session still holding a key retired by a rotation gets `StaleSessionKey`,
/// so nothing is ever sealed under a key the record no longer vouches for.
/// Users without a master-password record have nothing to rotate and are not
/// checked.
pub(crate) fn current_master_key<S: SecretStorage>(
    session: &dyn SessionKeyProvider,
    storage: &S,
) -> Result<MasterKey> {
    let key = session.session_key()?;
    let user_id = session.user_id();
    if let Some(record) = storage.get_master_record(user_id)? {
        if !record.master_key.matches(&key)? {
            return Err(VaultError::StaleSessionKey(user_id));
        }
    }
    Ok(key)
}

// ============================================================================
// Master-key derivation and wrapping under a password
// ============================================================================

/// Derive a master key from `material` under a fresh per-user salt.
pub(crate) fn derive_master_key(
    material: &[u8],
    kdf: KdfParams,
) -> Result<(MasterKey, MasterKeyParams)> {
    let salt = generate_salt()?;
    let key = MasterKey::derive(material, &salt, &kdf)?;
    let fingerprint = key.fingerprint()?.to_vec();
    Ok((
        key,
        MasterKeyParams {
            salt: salt.to_vec(),
            kdf,
            fingerprint,
        },
    ))
}

/// Wrap `master_key` under a key derived from `password` with a fresh salt.
///
/// The ciphertext is bound to `user_id`, so a wrapped master key copied onto
/// another user's record does not open.
pub(crate) fn seal_master_key(
    user_id: UserId,
    master_key: &MasterKey,
    password: &str,
    kdf: KdfParams,
) -> Result<(Vec<u8>, WrappingKeyParams)> {
    let salt = generate_salt()?;
    let unlock_key = derive_key_from_password(password.as_bytes(), &salt, &kdf)?;
    let context = MasterPasswordRecord::encryption_context(user_id);
    let wrapped = encrypt(master_key.as_bytes(), &unlock_key[..], Some(&context))?;
    Ok((
        wrapped,
        WrappingKeyParams {
            salt: salt.to_vec(),
            kdf,
        },
    ))
}

/// Inverse of `seal_master_key`.
pub(crate) fn open_master_key(record: &MasterPasswordRecord, password: &str) -> Result<MasterKey> {
    let unlock_key = derive_key_from_password(
        password.as_bytes(),
        &record.wrapping.salt,
        &record.wrapping.kdf,
    )?;
    let context = MasterPasswordRecord::encryption_context(record.user_id);
    let raw = Zeroizing::new(decrypt(
        &record.wrapped_master_key,
        &unlock_key[..],
        Some(&context),
    )?);
    Ok(MasterKey::from_bytes(&raw)?)
}

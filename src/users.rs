//! Per-user master-password records.
//!
//! A record carries two independent things derived from the login password: a
//! one-way hash used to check the password, and an Argon2id unlock key that
//! wraps the user's master key. Neither can be turned back into the password.

use std::sync::Arc;

use chrono::Utc;
use sysvault_crypto::{hash_password, MasterKey};
use tracing::{info, warn};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::locks::LockRegistry;
use crate::session::{derive_master_key, open_master_key, seal_master_key, Session};
use crate::storage::SecretStorage;
use crate::types::{MasterKeyParams, MasterPasswordRecord, UserId};

pub struct MasterPasswordService<S> {
    storage: Arc<S>,
    locks: Arc<LockRegistry>,
    config: Arc<VaultConfig>,
}

impl<S: SecretStorage> MasterPasswordService<S> {
    pub fn new(storage: Arc<S>, locks: Arc<LockRegistry>, config: Arc<VaultConfig>) -> Self {
        Self {
            storage,
            locks,
            config,
        }
    }

    /// Create a user's record with a master key derived from `master_material`
    /// and a fresh salt.
    pub fn create_with_master_pass(
        &self,
        user_id: UserId,
        password: &str,
        master_material: &[u8],
    ) -> Result<MasterPasswordRecord> {
        let (master_key, params) = derive_master_key(master_material, self.config.kdf)?;
        let record = self.build_record(user_id, password, &master_key, params)?;

        let _exclusive = self.locks.user_exclusive(user_id);
        self.storage.transaction(|tx| {
            if tx.get_master_record(user_id)?.is_some() {
                return Err(VaultError::MasterRecordExists(user_id));
            }
            tx.put_master_record(&record)
        })?;

        info!(user_id, "created master password record");
        Ok(record)
    }

    /// Check `password` against the stored login hash and return the record.
    pub fn verify_password(&self, user_id: UserId, password: &str) -> Result<MasterPasswordRecord> {
        let record = self
            .storage
            .get_master_record(user_id)?
            .ok_or(VaultError::MasterRecordNotFound(user_id))?;
        if !sysvault_crypto::verify_password(password, &record.login_hash)? {
            warn!(user_id, "master password verification failed");
            return Err(VaultError::InvalidCredentials(user_id));
        }
        Ok(record)
    }

    /// Verify the password and open a session holding the user's master key.
    pub fn authenticate(&self, user_id: UserId, password: &str) -> Result<Session> {
        let record = self.verify_password(user_id, password)?;
        let session = Session::unlock(&record, password)?;
        info!(user_id, "session unlocked");
        Ok(session)
    }

    /// Re-hash the login password and re-wrap the same master key under it.
    ///
    /// Secret fields are untouched: their keys stay wrapped by the master key.
    pub fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let _exclusive = self.locks.user_exclusive(user_id);
        let current = self.verify_password(user_id, old_password)?;
        let master_key = open_master_key(&current, old_password)?;

        let mut updated =
            self.build_record(user_id, new_password, &master_key, current.master_key.clone())?;
        updated.last_rotated_at = current.last_rotated_at;
        self.storage.transaction(|tx| tx.put_master_record(&updated))?;

        info!(user_id, "master password changed");
        Ok(())
    }

    fn build_record(
        &self,
        user_id: UserId,
        password: &str,
        master_key: &MasterKey,
        master_key_params: MasterKeyParams,
    ) -> Result<MasterPasswordRecord> {
        let login_hash = hash_password(password, &self.config.kdf)?;
        let (wrapped_master_key, wrapping) =
            seal_master_key(user_id, master_key, password, self.config.kdf)?;
        Ok(MasterPasswordRecord {
            user_id,
            login_hash,
            wrapped_master_key,
            wrapping,
            master_key: master_key_params,
            last_rotated_at: Utc::now(),
        })
    }
}

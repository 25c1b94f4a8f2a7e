//! Master-key rotation.
//!
//! Every encrypted field of the user is decrypted with the old master key and
//! sealed again under the new one, with a fresh per-secret key. The fields and
//! the new master-password record are written in one storage transaction: if any
//! field fails, nothing is written and the old record stays in force.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sysvault_crypto::verify_password;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::fields::{open_field, seal_field};
use crate::locks::LockRegistry;
use crate::session::{derive_master_key, seal_master_key, SessionKeyProvider};
use crate::storage::SecretStorage;
use crate::types::{MasterPasswordRecord, UserId};

/// Outcome of a committed rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub user_id: UserId,
    /// Encrypted fields sealed under the new key. Empty values are skipped.
    pub fields_rekeyed: usize,
    pub rotated_at: DateTime<Utc>,
}

pub struct MasterKeyRotation<S> {
    storage: Arc<S>,
    session: Arc<dyn SessionKeyProvider>,
    locks: Arc<LockRegistry>,
    config: Arc<VaultConfig>,
}

impl<S: SecretStorage> MasterKeyRotation<S> {
    pub fn new(
        storage: Arc<S>,
        session: Arc<dyn SessionKeyProvider>,
        locks: Arc<LockRegistry>,
        config: Arc<VaultConfig>,
    ) -> Self {
        Self {
            storage,
            session,
            locks,
            config,
        }
    }

    /// Replace `user_id`'s master key with one derived from `new_material`.
    ///
    /// `password` is the user's current login password. It is checked against
    /// the stored hash and re-wraps the new master key. The session's key must be
    /// the current master key; it is swapped for the new one once the rotation
    /// commits. Other sessions of the user keep the retired key and are refused
    /// with `StaleSessionKey` until they log in again.
    pub fn rotate(
        &self,
        user_id: UserId,
        new_material: &[u8],
        password: &str,
    ) -> Result<RotationReport> {
        let started = Instant::now();
        let session_user = self.session.user_id();
        if session_user != user_id {
            return Err(VaultError::SessionMismatch {
                session: session_user,
                requested: user_id,
            });
        }

        let _exclusive = self.locks.user_exclusive(user_id);

        let current = self
            .storage
            .get_master_record(user_id)?
            .ok_or(VaultError::MasterRecordNotFound(user_id))?;
        if !verify_password(password, &current.login_hash)? {
            warn!(user_id, "rotation refused: password verification failed");
            return Err(VaultError::InvalidCredentials(user_id));
        }

        let old_key = self.session.session_key()?;
        if !current.master_key.matches(&old_key)? {
            warn!(user_id, "rotation refused: session holds a retired master key");
            return Err(VaultError::StaleSessionKey(user_id));
        }
        let (new_key, master_key) = derive_master_key(new_material, self.config.kdf)?;
        let (wrapped_master_key, wrapping) =
            seal_master_key(user_id, &new_key, password, self.config.kdf)?;
        let rotated_at = Utc::now();
        let new_record = MasterPasswordRecord {
            user_id,
            login_hash: current.login_hash.clone(),
            wrapped_master_key,
            wrapping,
            master_key,
            last_rotated_at: rotated_at,
        };

        let result = self.storage.transaction(|tx| {
            let fields = tx.encrypted_fields_for_user(user_id)?;
            if fields.len() > self.config.rotation_max_fields {
                return Err(VaultError::RotationAborted(format!(
                    "{} encrypted fields exceed the budget of {}",
                    fields.len(),
                    self.config.rotation_max_fields
                )));
            }

            let mut rekeyed = 0;
            for field in fields.iter().filter(|f| !f.data.is_empty()) {
                self.check_deadline(started)?;
                let value = Zeroizing::new(open_field(
                    field,
                    &old_key,
                    self.config.max_wrapped_key_len,
                )?);
                let resealed = seal_field(
                    field.key,
                    user_id,
                    value.as_bytes(),
                    &new_key,
                    self.config.max_wrapped_key_len,
                )?;
                if !tx.update_field(&resealed)? {
                    return Err(VaultError::FieldNotFound(field.key));
                }
                rekeyed += 1;
            }

            self.check_deadline(started)?;
            tx.put_master_record(&new_record)?;
            Ok(rekeyed)
        });

        let fields_rekeyed = match result {
            Ok(n) => n,
            Err(e) => {
                warn!(user_id, error = %e, "master key rotation aborted, nothing written");
                return Err(e);
            }
        };

        self.session.replace_key(new_key);
        info!(
            user_id,
            fields_rekeyed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "master key rotated"
        );

        Ok(RotationReport {
            user_id,
            fields_rekeyed,
            rotated_at,
        })
    }

    fn check_deadline(&self, started: Instant) -> Result<()> {
        if started.elapsed() > self.config.rotation_timeout() {
            return Err(VaultError::RotationAborted(format!(
                "exceeded the time budget of {} ms",
                self.config.rotation_timeout_ms
            )));
        }
        Ok(())
    }
}

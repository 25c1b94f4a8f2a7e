//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysvault_crypto::{KdfParams, MAX_WRAPPED_KEY_LENGTH};
use tracing::warn;

use crate::error::{Result, VaultError};

/// Recommended Argon2id floor; lower values are accepted with a warning.
const RECOMMENDED_MEMORY_KIB: u32 = 19 * 1024;
const RECOMMENDED_ITERATIONS: u32 = 2;

/// Engine settings, loadable from JSON. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Ceiling for wrapped per-secret keys, checked before anything is persisted.
    pub max_wrapped_key_len: usize,
    /// Argon2id cost for login hashes and unlock-key derivation.
    pub kdf: KdfParams,
    /// Wall-clock budget for a master-key rotation.
    pub rotation_timeout_ms: u64,
    /// Row budget for a master-key rotation.
    pub rotation_max_fields: usize,
    /// SQLite database file. `None` means the caller supplies storage.
    pub database_path: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_wrapped_key_len: MAX_WRAPPED_KEY_LENGTH,
            kdf: KdfParams::default(),
            rotation_timeout_ms: 5 * 60 * 1000,
            rotation_max_fields: 100_000,
            database_path: None,
        }
    }
}

impl VaultConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn rotation_timeout(&self) -> Duration {
        Duration::from_millis(self.rotation_timeout_ms)
    }

    /// Reject unusable settings; warn on weak KDF costs.
    pub fn validate(&self) -> Result<()> {
        if self.max_wrapped_key_len == 0 || self.max_wrapped_key_len > MAX_WRAPPED_KEY_LENGTH {
            return Err(VaultError::Config(format!(
                "max_wrapped_key_len must be in 1..={}, got {}",
                MAX_WRAPPED_KEY_LENGTH, self.max_wrapped_key_len
            )));
        }
        if self.rotation_timeout_ms == 0 {
            return Err(VaultError::Config(
                "rotation_timeout_ms must be positive".to_string(),
            ));
        }
        if self.rotation_max_fields == 0 {
            return Err(VaultError::Config(
                "rotation_max_fields must be positive".to_string(),
            ));
        }
        if self.kdf.iterations == 0 || self.kdf.parallelism == 0 {
            return Err(VaultError::Config(
                "kdf iterations and parallelism must be positive".to_string(),
            ));
        }

        if self.kdf.memory_kib < RECOMMENDED_MEMORY_KIB {
            warn!(
                memory_kib = self.kdf.memory_kib,
                recommended = RECOMMENDED_MEMORY_KIB,
                "argon2 memory below recommended production value"
            );
        }
        if self.kdf.iterations < RECOMMENDED_ITERATIONS {
            warn!(
                iterations = self.kdf.iterations,
                recommended = RECOMMENDED_ITERATIONS,
                "argon2 iterations below recommended production value"
            );
        }
        Ok(())
    }
}

//! The master key: wraps every per-secret key of a user.

use std::fmt;

use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::hkdf::hkdf_derive;
use crate::password::{derive_key_from_password, KdfParams};
use crate::types::AES_KEY_LENGTH;

const FINGERPRINT_SALT: &[u8] = b"sysvault:key-fingerprint-salt:v1";
const FINGERPRINT_INFO: &[u8] = b"sysvault:key-fingerprint:v1";

/// A 256-bit master key. Zeroized on drop, redacted in `Debug`.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; AES_KEY_LENGTH]>);

impl MasterKey {
    /// Derive a master key from master-key material (e.g. a master password)
    /// with Argon2id and a stored per-user salt.
    ///
    /// The same material and salt always yield the same key.
    pub fn derive(material: &[u8], salt: &[u8], params: &KdfParams) -> Result<Self, CryptoError> {
        if material.is_empty() {
            return Err(CryptoError::EmptyKeyMaterial);
        }
        derive_key_from_password(material, salt, params).map(Self)
    }

    /// Wrap raw 32-byte key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != AES_KEY_LENGTH {
            return Err(CryptoError::InvalidKeyLength {
                expected: AES_KEY_LENGTH,
                got: bytes.len(),
            });
        }
        let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Generate a random master key.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
        getrandom::getrandom(&mut key[..]).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// One-way check value identifying this key.
    ///
    /// Stored next to the wrapped key so a holder of a retired key can be told
    /// apart from a holder of the current one without trial decryption.
    pub fn fingerprint(&self) -> Result<[u8; AES_KEY_LENGTH], CryptoError> {
        let okm = hkdf_derive(self.as_bytes(), FINGERPRINT_SALT, FINGERPRINT_INFO)?;
        Ok(*okm)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

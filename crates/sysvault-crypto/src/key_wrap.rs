//! Per-secret key primitives.
//!
//! Each secret gets a random 256-bit key. The secret is encrypted with that key,
//! and the key itself is wrapped (encrypted) under the master key with AES-GCM
//! using a dedicated AAD label, so data blobs and wrapped keys are never
//! interchangeable.
//!
//! Wrapped key wire format: the v1 cipher format around the 32-byte key, 61 bytes.

use zeroize::Zeroizing;

use crate::cipher::{decrypt, decrypt_with_aad, encrypt, encrypt_with_aad};
use crate::error::CryptoError;
use crate::types::{EncryptionContext, AES_KEY_LENGTH, MAX_WRAPPED_KEY_LENGTH};

const KEY_WRAP_AAD: &[u8] = b"sysvault:key-wrap:v1";

/// Generate a random 256-bit per-secret key.
pub fn generate_key() -> Result<Zeroizing<[u8; AES_KEY_LENGTH]>, CryptoError> {
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    getrandom::getrandom(&mut key[..]).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(key)
}

/// Reject wrapped keys above `max` bytes.
///
/// An oversized wrapped key means a corrupted or foreign key format, so it is an
/// internal error and never truncated.
pub fn check_wrapped_key_len(wrapped_key: &[u8], max: usize) -> Result<(), CryptoError> {
    if wrapped_key.len() > max {
        return Err(CryptoError::WrappedKeyTooLarge {
            max,
            got: wrapped_key.len(),
        });
    }
    Ok(())
}

/// Wrap an existing 32-byte key under `wrapping_key`.
pub fn wrap_key(key: &[u8], wrapping_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    let wrapped = encrypt_with_aad(key, wrapping_key, KEY_WRAP_AAD)?;
    check_wrapped_key_len(&wrapped, MAX_WRAPPED_KEY_LENGTH)?;
    Ok(wrapped)
}

/// Generate a fresh per-secret key and return it wrapped under `wrapping_key`.
pub fn make_wrapped_key(wrapping_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = generate_key()?;
    wrap_key(&key[..], wrapping_key)
}

/// Unwrap a per-secret key.
///
/// Fails with [`CryptoError::UnwrapFailed`] when `wrapping_key` is wrong or stale,
/// or when the wrapped blob was modified.
pub fn unwrap_key(
    wrapped_key: &[u8],
    wrapping_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    check_wrapped_key_len(wrapped_key, MAX_WRAPPED_KEY_LENGTH)?;

    let key = Zeroizing::new(
        decrypt_with_aad(wrapped_key, wrapping_key, KEY_WRAP_AAD).map_err(|e| match e {
            CryptoError::DecryptionFailed => CryptoError::UnwrapFailed,
            other => other,
        })?,
    );

    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    Ok(key)
}

/// Encrypt `plaintext` with the per-secret key inside `wrapped_key`.
pub fn seal(
    plaintext: &[u8],
    wrapped_key: &[u8],
    wrapping_key: &[u8],
    context: Option<&EncryptionContext>,
) -> Result<Vec<u8>, CryptoError> {
    let key = unwrap_key(wrapped_key, wrapping_key)?;
    encrypt(plaintext, &key, context)
}

/// Decrypt `ciphertext` with the per-secret key inside `wrapped_key`.
pub fn open(
    ciphertext: &[u8],
    wrapped_key: &[u8],
    wrapping_key: &[u8],
    context: Option<&EncryptionContext>,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let key = unwrap_key(wrapped_key, wrapping_key)?;
    decrypt(ciphertext, &key, context).map(Zeroizing::new)
}

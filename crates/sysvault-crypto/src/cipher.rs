//! AES-256-GCM encryption for secret field data.
//!
//! Wire format v1:
//! [1 byte: version=1][12 bytes: IV][N bytes: ciphertext + tag]
//! Every failure to authenticate (bad tag, truncation, unknown version) is
//! reported as an integrity error.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::CryptoError;
use crate::types::{
    EncryptionContext, AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KEY_LENGTH, CURRENT_VERSION,
    SUPPORTED_VERSIONS,
};

/// Generate a random 12-byte IV for AES-GCM.
pub fn generate_iv() -> Result<[u8; AES_GCM_IV_LENGTH], CryptoError> {
    let mut iv = [0u8; AES_GCM_IV_LENGTH];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(iv)
}

fn new_cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: AES_KEY_LENGTH,
        got: key.len(),
    })
}

/// Encrypt `plaintext` under a 32-byte key.
///
/// Returns: [version=1:1B][IV:12B][ciphertext+tag]
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8],
    context: Option<&EncryptionContext>,
) -> Result<Vec<u8>, CryptoError> {
    let aad = context.map(EncryptionContext::to_aad).unwrap_or_default();
    encrypt_with_aad(plaintext, key, &aad)
}

/// Decrypt a v1 blob under a 32-byte key.
pub fn decrypt(
    blob: &[u8],
    key: &[u8],
    context: Option<&EncryptionContext>,
) -> Result<Vec<u8>, CryptoError> {
    let aad = context.map(EncryptionContext::to_aad).unwrap_or_default();
    decrypt_with_aad(blob, key, &aad)
}

/// Encrypt with raw AAD bytes. Used by key wrapping, which carries its own label.
pub(crate) fn encrypt_with_aad(
    plaintext: &[u8],
    key: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = new_cipher(key)?;
    let iv = generate_iv()?;
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(1 + iv.len() + ciphertext.len());
    result.push(CURRENT_VERSION);
    result.extend_from_slice(&iv);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

pub(crate) fn decrypt_with_aad(blob: &[u8], key: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = new_cipher(key)?;

    let min_length = 1 + AES_GCM_IV_LENGTH + AES_GCM_TAG_LENGTH;
    if blob.len() < min_length {
        return Err(CryptoError::DataTooShort);
    }

    let version = blob[0];
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(CryptoError::UnsupportedVersion(version));
    }

    let iv = &blob[1..1 + AES_GCM_IV_LENGTH];
    let ciphertext = &blob[1 + AES_GCM_IV_LENGTH..];
    let nonce = Nonce::from_slice(iv);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}

use thiserror::Error;

/// Coarse classification of a [`CryptoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoErrorKind {
    /// Authentication failed: tampered data or wrong/stale key. Never retried.
    Integrity,
    /// Malformed key material. Programmer or configuration error.
    InvalidKey,
    /// Unexpected state (oversized blobs, RNG or KDF failure).
    Internal,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Key material must not be empty")]
    EmptyKeyMaterial,

    #[error("Encrypted data too short")]
    DataTooShort,

    #[error("Unsupported encryption version: {0}")]
    UnsupportedVersion(u8),

    #[error("Wrapped key too large: {got} bytes exceeds limit of {max}")]
    WrappedKeyTooLarge { max: usize, got: usize },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    #[error("Key unwrap failed: authentication tag mismatch")]
    UnwrapFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}

impl CryptoError {
    pub fn kind(&self) -> CryptoErrorKind {
        match self {
            CryptoError::DataTooShort
            | CryptoError::UnsupportedVersion(_)
            | CryptoError::DecryptionFailed
            | CryptoError::UnwrapFailed => CryptoErrorKind::Integrity,
            CryptoError::InvalidKeyLength { .. } | CryptoError::EmptyKeyMaterial => {
                CryptoErrorKind::InvalidKey
            }
            CryptoError::WrappedKeyTooLarge { .. }
            | CryptoError::EncryptionFailed(_)
            | CryptoError::KeyDerivation(_)
            | CryptoError::PasswordHash(_)
            | CryptoError::RngFailed(_) => CryptoErrorKind::Internal,
        }
    }
}

use sysvault_crypto::{CryptoError, CryptoErrorKind};
use thiserror::Error;

use crate::types::{DefinitionId, FieldKey, UserId};

pub type Result<T> = std::result::Result<T, VaultError>;

/// Classification handed to callers so they can map failures to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tampered data or wrong/stale key. Never retried.
    Integrity,
    /// Malformed key material.
    InvalidKey,
    /// Unexpected state: oversized wrapped key, budget exceeded, bad config.
    Internal,
    /// A record was expected but is absent.
    NotFound,
    /// Bad password or no unlocked session.
    Unauthenticated,
    /// Persistence failure from the storage collaborator.
    Storage,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Secret field already exists: {0}")]
    DuplicateField(FieldKey),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Secret field not found: {0}")]
    FieldNotFound(FieldKey),

    #[error("Field definition not found: {0}")]
    DefinitionNotFound(DefinitionId),

    #[error("Master password record not found for user {0}")]
    MasterRecordNotFound(UserId),

    #[error("Master password record already exists for user {0}")]
    MasterRecordExists(UserId),

    #[error("Invalid credentials for user {0}")]
    InvalidCredentials(UserId),

    #[error("Session is locked: no master key available")]
    SessionLocked,

    #[error("Session belongs to user {session}, operation targets user {requested}")]
    SessionMismatch { session: UserId, requested: UserId },

    #[error("Session key for user {0} was retired by a master key rotation")]
    StaleSessionKey(UserId),

    #[error("Encrypted field has no wrapped key: {0}")]
    MissingWrappedKey(FieldKey),

    #[error("Stored value is not valid UTF-8: {0}")]
    InvalidUtf8(FieldKey),

    #[error("Rotation aborted: {0}")]
    RotationAborted(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Crypto(e) => match e.kind() {
                CryptoErrorKind::Integrity => ErrorKind::Integrity,
                CryptoErrorKind::InvalidKey => ErrorKind::InvalidKey,
                CryptoErrorKind::Internal => ErrorKind::Internal,
            },
            VaultError::Storage(_) => ErrorKind::Storage,
            VaultError::FieldNotFound(_)
            | VaultError::DefinitionNotFound(_)
            | VaultError::MasterRecordNotFound(_) => ErrorKind::NotFound,
            VaultError::InvalidCredentials(_)
            | VaultError::SessionLocked
            | VaultError::SessionMismatch { .. }
            | VaultError::StaleSessionKey(_) => ErrorKind::Unauthenticated,
            VaultError::MissingWrappedKey(_) | VaultError::InvalidUtf8(_) => ErrorKind::Integrity,
            VaultError::MasterRecordExists(_)
            | VaultError::RotationAborted(_)
            | VaultError::Config(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Storage(StorageError::Sqlite(e))
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Storage(StorageError::Serialization(e))
    }
}

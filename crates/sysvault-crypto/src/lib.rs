//! Cryptographic primitives for secret field encryption: AES-256-GCM blobs,
//! per-secret key wrapping, HKDF, and Argon2id password hashing/derivation.

pub mod cipher;
pub mod error;
pub mod hkdf;
pub mod key_wrap;
pub mod master_key;
pub mod password;
pub mod types;

pub use cipher::{decrypt, encrypt};
pub use error::{CryptoError, CryptoErrorKind};
pub use hkdf::hkdf_derive;
pub use key_wrap::{
    check_wrapped_key_len, generate_key, make_wrapped_key, open, seal, unwrap_key, wrap_key,
};
pub use master_key::MasterKey;
pub use password::{
    derive_key_from_password, generate_salt, hash_password, verify_password, KdfParams,
};
pub use types::{
    EncryptionContext, AES_KEY_LENGTH, CURRENT_VERSION, MAX_WRAPPED_KEY_LENGTH, SALT_LENGTH,
    WRAPPED_KEY_SIZE,
};

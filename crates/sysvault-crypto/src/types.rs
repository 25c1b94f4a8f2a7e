/// Wire format version for encrypted blobs.
///
/// Version 1: AES-256-GCM, random 96-bit IV per blob.
/// Format: [version=1:1B][IV:12B][ciphertext+tag]
/// Wrapped per-secret keys use the same format with a dedicated AAD label.
pub const CURRENT_VERSION: u8 = 1;

/// Supported wire format versions (for decryption).
pub const SUPPORTED_VERSIONS: &[u8] = &[1];

/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// Size of a wrapped per-secret key: version + IV + 32-byte key + tag.
pub const WRAPPED_KEY_SIZE: usize = 1 + AES_GCM_IV_LENGTH + AES_KEY_LENGTH + AES_GCM_TAG_LENGTH;

/// Hard ceiling for wrapped key blobs accepted at any boundary.
pub const MAX_WRAPPED_KEY_LENGTH: usize = 1000;

/// Salt length for password-based key derivation.
pub const SALT_LENGTH: usize = 16;

/// Context for binding ciphertext to a specific item via AAD.
/// Prevents ciphertext relocation between fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionContext {
    /// Namespace of the item (e.g. a module/definition pair).
    pub scope: String,
    /// Item identifier inside the scope.
    pub item: String,
}

impl EncryptionContext {
    pub fn new(scope: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            item: item.into(),
        }
    }

    /// Build AAD bytes.
    /// Format: [4 bytes: scope length (u32 BE)][scope UTF-8][item UTF-8]
    pub fn to_aad(&self) -> Vec<u8> {
        let scope_bytes = self.scope.as_bytes();
        let item_bytes = self.item.as_bytes();
        let mut aad = Vec::with_capacity(4 + scope_bytes.len() + item_bytes.len());
        aad.extend_from_slice(&(scope_bytes.len() as u32).to_be_bytes());
        aad.extend_from_slice(scope_bytes);
        aad.extend_from_slice(item_bytes);
        aad
    }
}

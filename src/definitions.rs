//! Field definition lookup.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;
use regex::bytes::Regex;

use crate::error::{Result, VaultError};
use crate::types::{DefinitionId, FieldDefinition};

/// Source of field definitions. Consulted on every write, since a definition's
/// encryption flag can change between writes.
pub trait DefinitionLookup: Send + Sync {
    fn get_definition(&self, id: DefinitionId) -> Result<FieldDefinition>;
}

/// HTML form id for a field name: `cf_` + lowercase name without non-word characters.
///
/// Works on bytes: only ASCII letters, digits and `_` survive, so every byte of
/// a multi-byte character is dropped.
pub fn form_id_for_name(name: &str) -> Result<String> {
    static NON_WORD: LazyLock<std::result::Result<Regex, regex::Error>> =
        LazyLock::new(|| Regex::new(r"(?-u:\W)+"));
    let re = NON_WORD
        .as_ref()
        .map_err(|e| VaultError::Config(format!("form id pattern: {e}")))?;
    let stripped = re.replace_all(name.as_bytes(), &b""[..]);
    Ok(format!(
        "cf_{}",
        String::from_utf8_lossy(&stripped).to_ascii_lowercase()
    ))
}

impl FieldDefinition {
    pub fn form_id(&self) -> Result<String> {
        form_id_for_name(&self.name)
    }
}

/// In-memory definition registry.
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<DefinitionId, FieldDefinition>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition. Returns the previous one, if any.
    pub fn register(&self, definition: FieldDefinition) -> Option<FieldDefinition> {
        self.definitions.write().insert(definition.id, definition)
    }

    pub fn remove(&self, id: DefinitionId) -> Option<FieldDefinition> {
        self.definitions.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}

impl DefinitionLookup for DefinitionRegistry {
    fn get_definition(&self, id: DefinitionId) -> Result<FieldDefinition> {
        self.definitions
            .read()
            .get(&id)
            .cloned()
            .ok_or(VaultError::DefinitionNotFound(id))
    }
}

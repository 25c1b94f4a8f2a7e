//! Integration tests for the secret field engine over every storage backend.

mod common;
mod field_store;
#[cfg(feature = "sqlite")]
mod sqlite_storage;

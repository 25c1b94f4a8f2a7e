//! Per-user and per-field lock registry.
//!
//! Field reads and writes hold the shared side of their user's lock, and writes
//! also hold the field's own mutex. Master-key rotation holds the exclusive side
//! of the user's lock, so nothing under that user's key can interleave with it.
//!
//! Field mutexes live only while someone holds or waits for them; the entry is
//! dropped when the last guard goes away.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::{ArcMutexGuard, ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawMutex, RawRwLock, RwLock};

use crate::types::{FieldKey, UserId};

pub type UserSharedGuard = ArcRwLockReadGuard<RawRwLock, ()>;
pub type UserExclusiveGuard = ArcRwLockWriteGuard<RawRwLock, ()>;
pub type FieldGuard = ArcMutexGuard<RawMutex, ()>;

/// Guards held for the duration of one field write.
pub struct FieldWriteGuard<'a> {
    registry: &'a LockRegistry,
    key: FieldKey,
    field: Option<FieldGuard>,
    // Released after the field, once `drop` returns.
    _user: UserSharedGuard,
}

impl Drop for FieldWriteGuard<'_> {
    fn drop(&mut self) {
        drop(self.field.take());
        self.registry.release_field(self.key);
    }
}

#[derive(Default)]
pub struct LockRegistry {
    users: Mutex<HashMap<UserId, Arc<RwLock<()>>>>,
    fields: Mutex<HashMap<FieldKey, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn user_lock(&self, user_id: UserId) -> Arc<RwLock<()>> {
        Arc::clone(self.users.lock().entry(user_id).or_default())
    }

    fn field_lock(&self, key: FieldKey) -> Arc<Mutex<()>> {
        Arc::clone(self.fields.lock().entry(key).or_default())
    }

    pub fn user_shared(&self, user_id: UserId) -> UserSharedGuard {
        self.user_lock(user_id).read_arc()
    }

    pub fn user_exclusive(&self, user_id: UserId) -> UserExclusiveGuard {
        self.user_lock(user_id).write_arc()
    }

    /// Lock one field for a write made under `user_id`'s master key.
    pub fn field_write(&self, user_id: UserId, key: FieldKey) -> FieldWriteGuard<'_> {
        let user = self.user_shared(user_id);
        let field = self.field_lock(key).lock_arc();
        FieldWriteGuard {
            registry: self,
            key,
            field: Some(field),
            _user: user,
        }
    }

    /// Forget `key`'s mutex if the map holds the only reference.
    ///
    /// Handles are cloned only under the map lock, so a count of one here means
    /// no thread holds or waits for the mutex.
    fn release_field(&self, key: FieldKey) {
        let mut fields = self.fields.lock();
        if fields
            .get(&key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            fields.remove(&key);
        }
    }

    pub fn tracked_fields(&self) -> usize {
        self.fields.lock().len()
    }
}

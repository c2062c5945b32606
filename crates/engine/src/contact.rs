//! Guest contact resolution boundary.
//!
//! Identity management is external; the engine only resolves a user id to a
//! notification address when it needs to send something.

use std::collections::HashMap;
use std::sync::RwLock;

use wayfare_core::UserId;

/// Resolves a guest's notification address.
pub trait ContactDirectory: Send + Sync {
    fn email_of(&self, user_id: UserId) -> Option<String>;
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryContactDirectory {
    inner: RwLock<HashMap<UserId, String>>,
}

impl InMemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: UserId, email: impl Into<String>) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(user_id, email.into());
        }
    }
}

impl ContactDirectory for InMemoryContactDirectory {
    fn email_of(&self, user_id: UserId) -> Option<String> {
        let map = self.inner.read().ok()?;
        map.get(&user_id).cloned()
    }
}

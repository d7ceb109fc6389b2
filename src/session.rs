//! Session identity for the push channel.
//!
//! ARCHITECTURE
//! ============
//! The backend keys push channels by an opaque session id. The id is minted
//! lazily the first time the hub connects and then cached in a
//! session-scoped store, so every reconnect reuses it. The embedder picks the
//! store; the bundled [`MemorySessionStore`] lives exactly as long as the
//! process.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

/// Storage key the session id is cached under.
pub const SESSION_STORAGE_KEY: &str = "notification_session_id";

/// Key/value storage scoped to one session.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    /// Forget everything. The next [`get_or_create_session_id`] mints a new id.
    fn clear(&self);
}

/// Process-lifetime session storage.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
    }

    fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Generate a fresh session id (UUID v4, hyphenated).
#[must_use]
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Return the cached session id, creating and caching one if absent.
pub fn get_or_create_session_id(store: &dyn SessionStore) -> String {
    if let Some(existing) = store.get(SESSION_STORAGE_KEY).filter(|id| !id.is_empty()) {
        return existing;
    }
    let session_id = generate_session_id();
    store.set(SESSION_STORAGE_KEY, session_id.clone());
    tracing::debug!(%session_id, "hub: created notification session id");
    session_id
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

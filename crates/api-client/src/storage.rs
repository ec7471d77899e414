//! Session-scoped key-value storage and the bearer-token store on top of it.
//!
//! The storage lives as long as the browsing session (or the process, for
//! [`MemoryStorage`]). Access failures are never fatal for the token store:
//! a blocked or unavailable storage behaves like an empty one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use propdesk_api::token;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session storage unavailable: {0}")]
    Unavailable(String),

    #[error("session storage quota exceeded")]
    QuotaExceeded,
}

/// A `sessionStorage`-like string store.
pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage that lives as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".into()))
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Reads, writes and decodes the bearer token kept in session storage.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn SessionStorage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// The token stored under `key`. Storage failures read as "no token".
    pub fn get_token(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    /// Store `token` under `key`, replacing any previous value.
    pub fn save_token(&self, token: &str, key: &str) {
        self.set(key, token);
    }

    /// Remove the token under `key`. Idempotent.
    pub fn clear_token(&self, key: &str) {
        self.remove(key);
    }

    /// Decoded claims of the token under `key`.
    pub fn claims(&self, key: &str) -> Option<Value> {
        token::decode_token(&self.get_token(key)?)
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        match self.storage.get_item(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(err) => {
                debug!(key, error = %err, "session storage read failed");
                None
            }
        }
    }

    pub(crate) fn set(&self, key: &str, value: &str) {
        if let Err(err) = self.storage.set_item(key, value) {
            warn!(key, error = %err, "session storage write failed");
        }
    }

    pub(crate) fn remove(&self, key: &str) {
        if let Err(err) = self.storage.remove_item(key) {
            debug!(key, error = %err, "session storage remove failed");
        }
    }
}

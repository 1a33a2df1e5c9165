//! Browser-style key/value storage and the JSON adapter layered on top of it.
//!
//! [`Storage`] mirrors the `localStorage`/`sessionStorage` contract: string
//! keys, string values, and writes that can fail (quota exceeded, storage
//! disabled in private mode). [`PersistentStore`] is the only layer the rest of
//! the crate talks to; it never returns an error and degrades failures to
//! `false`/`None` after logging them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Storage backend failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("value for {key} was not persisted")]
    NotPersisted { key: String },
}

/// Consumer-provided storage backend.
///
/// Implement this over `web_sys::Storage` in a browser build, or use
/// [`MemoryStorage`] for native hosts and tests.
pub trait Storage: Send + Sync + 'static {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;
}

/// In-process [`Storage`] with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes once keys plus values would exceed `bytes`.
    #[must_use]
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded { key: key.to_owned() });
            }
        }
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// Keys holding opaque token strings are stored and read verbatim.
#[must_use]
pub fn is_token_key(key: &str) -> bool {
    key.to_ascii_lowercase().contains("token")
}

/// JSON adapter over a [`Storage`] backend.
///
/// Multi-key writes are not atomic: if the backend fails midway, earlier keys
/// stay written.
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn Storage>,
    label: &'static str,
}

impl PersistentStore {
    /// `label` only appears in log output (e.g. `"local"`, `"session"`).
    #[must_use]
    pub fn new(backend: Arc<dyn Storage>, label: &'static str) -> Self {
        Self { backend, label }
    }

    /// Serialize `value` as JSON and write it.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(storage = self.label, key, error = %e, "Failed to encode value");
                return false;
            }
        };
        self.write(key, &encoded)
    }

    /// Write `value` verbatim, without JSON encoding.
    pub fn set_raw(&self, key: &str, value: &str) -> bool {
        self.write(key, value)
    }

    /// Read and decode a value; token-like keys are decoded from the raw string.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read(key)?;
        let decoded = if is_token_key(key) {
            serde_json::from_value(JsonValue::String(raw))
        } else {
            serde_json::from_str(&raw)
        };
        match decoded {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(storage = self.label, key, error = %e, "Failed to decode stored value");
                None
            }
        }
    }

    #[must_use]
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Read the stored string without decoding.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.read(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.read(key).is_some()
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove_item(key) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(storage = self.label, key, error = %e, "Failed to remove key");
                false
            }
        }
    }

    pub fn clear(&self) -> bool {
        match self.backend.clear() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(storage = self.label, error = %e, "Failed to clear storage");
                false
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> bool {
        match self.backend.set_item(key, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(storage = self.label, key, error = %e, "Failed to write key");
                false
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(storage = self.label, key, error = %e, "Failed to read key");
                None
            }
        }
    }
}

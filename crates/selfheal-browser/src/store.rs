//! Persisted application state as an explicit capability
//!
//! The application under test keeps its session and cached data in
//! `localStorage`. The harness only touches the keys enumerated in
//! [`StoreKey`].

use crate::backend::BrowserBackend;
use crate::error::BrowserError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Keys the harness recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StoreKey {
    AuthToken,
    RefreshToken,
    UserRole,
    Username,
    UseFallbackData,
    Orders,
    Inventory,
    Settings,
    LastSync,
    MessageQueue,
}

impl StoreKey {
    /// Every recognised key
    pub const ALL: [StoreKey; 10] = [
        StoreKey::AuthToken,
        StoreKey::RefreshToken,
        StoreKey::UserRole,
        StoreKey::Username,
        StoreKey::UseFallbackData,
        StoreKey::Orders,
        StoreKey::Inventory,
        StoreKey::Settings,
        StoreKey::LastSync,
        StoreKey::MessageQueue,
    ];

    /// Keys holding the signed-in identity
    pub const AUTH: [StoreKey; 4] = [
        StoreKey::AuthToken,
        StoreKey::RefreshToken,
        StoreKey::UserRole,
        StoreKey::Username,
    ];

    /// Storage key string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthToken => "authToken",
            Self::RefreshToken => "refreshToken",
            Self::UserRole => "userRole",
            Self::Username => "username",
            Self::UseFallbackData => "useFallbackData",
            Self::Orders => "orders",
            Self::Inventory => "inventory",
            Self::Settings => "settings",
            Self::LastSync => "lastSync",
            Self::MessageQueue => "messageQueue",
        }
    }

    /// Check if this key belongs to the auth identity
    #[inline]
    #[must_use]
    pub fn is_auth(&self) -> bool {
        Self::AUTH.contains(self)
    }

    /// Auth keys as a preserve-set
    #[must_use]
    pub fn auth_set() -> HashSet<StoreKey> {
        Self::AUTH.into_iter().collect()
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read/write access to persisted application state
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key
    async fn get(&self, key: StoreKey) -> Result<Option<String>, BrowserError>;

    /// Write a key
    async fn set(&self, key: StoreKey, value: &str) -> Result<(), BrowserError>;

    /// Remove a key, returning whether it was present
    async fn remove(&self, key: StoreKey) -> Result<bool, BrowserError>;

    /// Remove every recognised key not in `preserve`; returns removed keys
    async fn clear(&self, preserve: &HashSet<StoreKey>) -> Result<Vec<StoreKey>, BrowserError> {
        let mut removed = Vec::new();
        for key in StoreKey::ALL {
            if preserve.contains(&key) {
                continue;
            }
            if self.remove(key).await? {
                removed.push(key);
            }
        }
        Ok(removed)
    }

    /// Remove exactly `keys`; returns the ones that were present
    async fn remove_all(&self, keys: &[StoreKey]) -> Result<Vec<StoreKey>, BrowserError> {
        let mut removed = Vec::new();
        for key in keys {
            if self.remove(*key).await? {
                removed.push(*key);
            }
        }
        Ok(removed)
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<StoreKey, String>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store seeded with entries
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = (StoreKey, String)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }

    /// Snapshot of current contents
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<StoreKey, String> {
        self.entries.lock().clone()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, BrowserError> {
        Ok(self.entries.lock().get(&key).cloned())
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), BrowserError> {
        self.entries.lock().insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: StoreKey) -> Result<bool, BrowserError> {
        Ok(self.entries.lock().remove(&key).is_some())
    }
}

/// Store backed by the page's `localStorage`
#[derive(Clone)]
pub struct BrowserStore {
    backend: Arc<dyn BrowserBackend>,
}

impl BrowserStore {
    /// Wrap a backend
    #[inline]
    #[must_use]
    pub fn new(backend: Arc<dyn BrowserBackend>) -> Self {
        Self { backend }
    }
}

impl fmt::Debug for BrowserStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserStore").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for BrowserStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, BrowserError> {
        self.backend.storage_get(key.as_str()).await
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), BrowserError> {
        self.backend.storage_set(key.as_str(), value).await
    }

    async fn remove(&self, key: StoreKey) -> Result<bool, BrowserError> {
        let existed = self.backend.storage_get(key.as_str()).await?.is_some();
        if existed {
            self.backend.storage_remove(key.as_str()).await?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStore {
        MemoryStore::with_entries(StoreKey::ALL.iter().map(|k| (*k, "v".to_string())))
    }

    #[tokio::test]
    async fn clear_preserves_auth_keys() {
        let store = seeded();
        let removed = store.clear(&StoreKey::auth_set()).await.unwrap();

        assert_eq!(removed.len(), StoreKey::ALL.len() - StoreKey::AUTH.len());
        assert!(removed.iter().all(|k| !k.is_auth()));

        let left = store.snapshot();
        assert_eq!(left.len(), 4);
        assert!(left.keys().all(StoreKey::is_auth));
    }

    #[tokio::test]
    async fn clear_with_empty_preserve_removes_everything() {
        let store = seeded();
        store.clear(&HashSet::new()).await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn remove_all_reports_present_keys_only() {
        let store = MemoryStore::with_entries([(StoreKey::AuthToken, "t".to_string())]);
        let removed = store.remove_all(&StoreKey::AUTH).await.unwrap();
        assert_eq!(removed, vec![StoreKey::AuthToken]);
    }

    #[test]
    fn key_strings_are_stable() {
        assert_eq!(StoreKey::UseFallbackData.as_str(), "useFallbackData");
        assert_eq!(StoreKey::AuthToken.to_string(), "authToken");
    }
}

//! Key-Value Storage Abstraction
//!
//! Session credentials live in a flat, string-keyed store that survives
//! application restarts and is scoped to one application origin. Browsers
//! back this with `localStorage`; desktop hosts use the OS credential store
//! adapter in `bridge-desktop`.
//!
//! The trait is deliberately synchronous: the session layer relies on being
//! able to read and write keys without yielding to the scheduler.

use crate::error::Result;

/// Persistent, origin-scoped string key-value store.
///
/// Implementations must make each individual `set`/`remove` durable before
/// returning. No atomicity across multiple keys is promised; callers that
/// write related keys must tolerate observing only some of them after a
/// crash.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// fn remember_theme(store: &dyn KeyValueStore) -> Result<()> {
///     store.set("theme", "dark")?;
///     assert_eq!(store.get("theme")?.as_deref(), Some("dark"));
///     Ok(())
/// }
/// ```
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any existing one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// List every key currently held by the store.
    ///
    /// Backends that cannot enumerate their entries return
    /// `BridgeError::NotAvailable`.
    fn keys(&self) -> Result<Vec<String>>;

    /// Returns true if the key exists with a non-empty value.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some_and(|value| !value.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<String, String>>,
        broken: bool,
    }

    impl KeyValueStore for MapStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            if self.broken {
                return Err(BridgeError::Storage("quota exceeded".to_string()));
            }
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        fn keys(&self) -> Result<Vec<String>> {
            Ok(self.entries.lock().unwrap().keys().cloned().collect())
        }
    }

    #[test]
    fn test_contains_treats_empty_as_absent() {
        let store = MapStore::default();
        store.set("empty", "").unwrap();
        store.set("present", "value").unwrap();

        assert!(!store.contains("empty").unwrap());
        assert!(store.contains("present").unwrap());
        assert!(!store.contains("missing").unwrap());
    }

    #[test]
    fn test_contains_propagates_errors() {
        let store = MapStore {
            broken: true,
            ..Default::default()
        };

        assert!(store.contains("anything").is_err());
    }
}

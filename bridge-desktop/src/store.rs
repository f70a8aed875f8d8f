//! Key-value stores for desktop hosts

use bridge_traits::{
    error::{BridgeError, Result},
    storage::KeyValueStore,
};
use keyring::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const SERVICE_PREFIX: &str = "portal-session";

/// Process-local store. Contents vanish when the process exits.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries().keys().cloned().collect())
    }
}

/// OS credential store backed `KeyValueStore`.
///
/// Uses the platform secret store through `keyring`:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: kernel keyutils
///
/// Every key is its own credential under a service name derived from the
/// application origin, so writes never touch unrelated keys.
///
/// The OS stores cannot enumerate their entries; [`KeyValueStore::keys`]
/// therefore reports `NotAvailable`.
pub struct KeyringKeyValueStore {
    service: String,
    entries: Mutex<HashMap<String, Arc<Entry>>>,
}

impl KeyringKeyValueStore {
    /// Store scoped to the given application origin.
    pub fn for_origin(origin: &str) -> Self {
        Self::with_service_name(Self::service_for_origin(origin))
    }

    pub fn with_service_name(service: impl Into<String>) -> Self {
        let service = service.into();
        debug!(service = %service, "Opened keyring key-value store");
        Self {
            service,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Keyring service name used for `origin`.
    pub fn service_for_origin(origin: &str) -> String {
        let origin = origin.trim().trim_end_matches('/');
        if origin.is_empty() {
            SERVICE_PREFIX.to_string()
        } else {
            format!("{}:{}", SERVICE_PREFIX, origin)
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// Entry handles are reused so every access to a key goes through the
    /// same credential.
    fn entry(&self, key: &str) -> Result<Arc<Entry>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(key) {
            return Ok(entry.clone());
        }
        let entry = Arc::new(Entry::new(&self.service, key).map_err(map_keyring_error)?);
        entries.insert(key.to_string(), entry.clone());
        Ok(entry)
    }
}

impl std::fmt::Debug for KeyringKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringKeyValueStore")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

fn map_keyring_error(e: keyring::Error) -> BridgeError {
    match e {
        keyring::Error::NoStorageAccess(inner) => {
            BridgeError::NotAvailable(format!("Keyring not accessible: {}", inner))
        }
        keyring::Error::PlatformFailure(inner) => {
            BridgeError::Storage(format!("Keyring failure: {}", inner))
        }
        other => BridgeError::Storage(format!("Keyring error: {}", other)),
    }
}

impl KeyValueStore for KeyringKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read keyring entry");
                Err(map_keyring_error(e))
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(map_keyring_error)?;
        debug!(key = key, "Stored keyring entry");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => {
                debug!(key = key, "Deleted keyring entry");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        Err(BridgeError::NotAvailable(
            "Keyring entries cannot be enumerated".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryKeyValueStore::new();
        store.set("accessToken", "a1").unwrap();
        assert_eq!(store.get("accessToken").unwrap().as_deref(), Some("a1"));

        store.remove("accessToken").unwrap();
        assert_eq!(store.get("accessToken").unwrap(), None);

        // Removing twice is fine
        store.remove("accessToken").unwrap();
    }

    fn mock_keyring() -> KeyringKeyValueStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeyringKeyValueStore::for_origin("https://portal.example.com")
    }

    #[test]
    fn test_keyring_store_roundtrip() {
        let store = mock_keyring();
        assert_eq!(store.get("labAccessToken").unwrap(), None);

        store.set("labAccessToken", "a1").unwrap();
        store.set("labAccessToken", "a2").unwrap();
        assert_eq!(store.get("labAccessToken").unwrap().as_deref(), Some("a2"));
        assert!(store.contains("labAccessToken").unwrap());

        store.remove("labAccessToken").unwrap();
        assert_eq!(store.get("labAccessToken").unwrap(), None);
        store.remove("labAccessToken").unwrap();
    }

    #[test]
    fn test_keyring_writes_leave_other_keys_alone() {
        let store = mock_keyring();
        store.set("labAccessToken", "lab-a").unwrap();
        store.set("labRefreshToken", "lab-r").unwrap();

        store.set("pharmacyAccessToken", "rx-a").unwrap();
        store.remove("pharmacyRefreshToken").unwrap();

        assert_eq!(store.get("labAccessToken").unwrap().as_deref(), Some("lab-a"));
        assert_eq!(store.get("labRefreshToken").unwrap().as_deref(), Some("lab-r"));
        assert_eq!(
            store.get("pharmacyAccessToken").unwrap().as_deref(),
            Some("rx-a")
        );
    }

    #[test]
    fn test_keyring_keys_are_not_enumerable() {
        let store = mock_keyring();
        assert!(matches!(store.keys(), Err(BridgeError::NotAvailable(_))));
    }

    #[test]
    fn test_service_name_per_origin() {
        assert_eq!(
            KeyringKeyValueStore::service_for_origin("https://portal.example.com/"),
            "portal-session:https://portal.example.com"
        );
        assert_eq!(KeyringKeyValueStore::service_for_origin(""), "portal-session");
        assert_eq!(
            KeyringKeyValueStore::with_service_name("custom").service_name(),
            "custom"
        );
    }
}

//! Session Storage
//!
//! Persists token pairs into the origin-scoped key-value store, one key per
//! token, under the keys of the session's [`Namespace`].
//!
//! ## Completeness
//!
//! The two keys of a pair are written separately and the underlying store
//! offers no multi-key atomicity. A crash, a concurrent writer or a manual
//! edit can therefore leave only one half on disk. [`SessionStore::load`]
//! treats such a slot as empty so that nothing downstream ever works with a
//! half session.
//!
//! ## Example
//!
//! ```no_run
//! use core_session::{Namespace, SessionStore, TokenPair};
//! # use bridge_traits::storage::KeyValueStore;
//! # use std::sync::Arc;
//! # fn example(kv: Arc<dyn KeyValueStore>) -> core_session::Result<()> {
//! let store = SessionStore::new(kv);
//!
//! store.save(Namespace::Lab, &TokenPair::new("access", "refresh"))?;
//! assert!(store.load(Namespace::Lab)?.is_some());
//!
//! store.clear(Namespace::Lab)?;
//! assert!(store.load(Namespace::Lab)?.is_none());
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::namespace::Namespace;
use crate::types::{Session, SlotState, TokenPair};
use bridge_traits::storage::KeyValueStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Namespaced token-pair persistence over a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Write both tokens, access token first.
    pub fn save(&self, namespace: Namespace, tokens: &TokenPair) -> Result<()> {
        let keys = namespace.keys();
        self.write(namespace, keys.access, &tokens.access_token)?;
        self.write(namespace, keys.refresh, &tokens.refresh_token)?;
        debug!(namespace = %namespace, "Stored token pair");
        Ok(())
    }

    /// Replace only the access token, keeping the stored refresh token.
    pub fn save_access_token(&self, namespace: Namespace, access_token: &str) -> Result<()> {
        self.write(namespace, namespace.keys().access, access_token)
    }

    /// The stored pair, or `None` unless both halves are present and
    /// non-empty.
    pub fn load(&self, namespace: Namespace) -> Result<Option<TokenPair>> {
        let keys = namespace.keys();
        let access = self.read(namespace, keys.access)?;
        let refresh = self.read(namespace, keys.refresh)?;

        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some(TokenPair::new(access, refresh))),
            (None, None) => Ok(None),
            _ => {
                debug!(namespace = %namespace, "Ignoring incomplete token pair");
                Ok(None)
            }
        }
    }

    /// Like [`load`](Self::load) but reports a half-written slot as
    /// [`AuthError::StorageIncomplete`] and an empty one as
    /// [`AuthError::NotAuthenticated`].
    pub fn require(&self, namespace: Namespace) -> Result<TokenPair> {
        match self.inspect(namespace)? {
            SlotState::Complete => self.load(namespace)?.ok_or(AuthError::NotAuthenticated),
            SlotState::Partial => Err(AuthError::StorageIncomplete { namespace }),
            SlotState::Empty => Err(AuthError::NotAuthenticated),
        }
    }

    pub fn session(&self, namespace: Namespace) -> Result<Option<Session>> {
        Ok(self
            .load(namespace)?
            .map(|tokens| Session::new(namespace, tokens)))
    }

    /// Every namespace that currently holds a complete session.
    pub fn sessions(&self) -> Result<BTreeMap<Namespace, Session>> {
        let mut sessions = BTreeMap::new();
        for namespace in Namespace::ALL {
            if let Some(session) = self.session(namespace)? {
                sessions.insert(namespace, session);
            }
        }
        Ok(sessions)
    }

    /// Which halves of the pair are present.
    pub fn inspect(&self, namespace: Namespace) -> Result<SlotState> {
        let keys = namespace.keys();
        let access = self.read(namespace, keys.access)?.is_some();
        let refresh = self.read(namespace, keys.refresh)?.is_some();
        Ok(match (access, refresh) {
            (true, true) => SlotState::Complete,
            (false, false) => SlotState::Empty,
            _ => SlotState::Partial,
        })
    }

    /// Remove both keys. Clearing an empty namespace is a no-op.
    pub fn clear(&self, namespace: Namespace) -> Result<()> {
        let keys = namespace.keys();
        let access = self.delete(namespace, keys.access);
        let refresh = self.delete(namespace, keys.refresh);
        access.and(refresh)?;
        debug!(namespace = %namespace, "Cleared token pair");
        Ok(())
    }

    fn read(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        let value = self.store.get(key).map_err(|e| {
            warn!(namespace = %namespace, key, error = %e, "Failed to read credential");
            AuthError::StorageUnavailable(e.to_string())
        })?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    fn write(&self, namespace: Namespace, key: &str, value: &str) -> Result<()> {
        self.store.set(key, value).map_err(|e| {
            warn!(namespace = %namespace, key, error = %e, "Failed to store credential");
            AuthError::StorageUnavailable(e.to_string())
        })
    }

    fn delete(&self, namespace: Namespace, key: &str) -> Result<()> {
        self.store.remove(key).map_err(|e| {
            warn!(namespace = %namespace, key, error = %e, "Failed to remove credential");
            AuthError::StorageUnavailable(e.to_string())
        })
    }
}

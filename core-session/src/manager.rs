//! # Session Manager
//!
//! High-level entry point that ties the namespace resolver, session store,
//! refresh coordinator and expiry monitor together.
//!
//! ## Overview
//!
//! - `login` resolves the namespace from the roles in the issued access
//!   token and stores the pair under that namespace's keys
//! - `valid_access_token` hands out the active token, refreshing it first
//!   when it is inside the refresh window
//! - `start_monitor` keeps the active session fresh in the background
//! - a failed background refresh clears the session, emits
//!   [`SessionEvent::SessionExpired`] and calls the host's expiry handler
//!
//! The manager tracks one *active* namespace: the last one signed in to or
//! restored. Sessions stored under other namespaces are left alone.
//!
//! ## Usage
//!
//! ```no_run
//! use core_session::{HttpAuthGateway, SessionManager, SessionSettings, SessionStore};
//! use core_runtime::events::EventBus;
//! # use bridge_traits::{http::HttpClient, storage::KeyValueStore};
//! # use std::sync::Arc;
//! # async fn example(
//! #     kv: Arc<dyn KeyValueStore>,
//! #     http: Arc<dyn HttpClient>,
//! # ) -> core_session::Result<()> {
//! let gateway = HttpAuthGateway::new(http, "https://portal.example.com/api/".parse().unwrap());
//! let manager = SessionManager::new(
//!     SessionStore::new(kv),
//!     Arc::new(gateway),
//!     EventBus::new(100),
//!     SessionSettings::default(),
//! )
//! .with_expiry_handler(|expired: &core_session::SessionExpired| {
//!     eprintln!("signed out of {}: {}", expired.namespace, expired.reason);
//! });
//!
//! let session = manager.login("pharmacist@clinic", "secret").await?;
//! let _monitor = manager.start_monitor();
//!
//! let token = manager.valid_access_token().await?;
//! # let _ = (session, token);
//! # Ok(())
//! # }
//! ```

use crate::claims::Claims;
use crate::coordinator::{RefreshCoordinator, SessionExpired, SessionExpiredHandler};
use crate::error::{AuthError, Result};
use crate::expiry::ExpiryEvaluator;
use crate::gateway::{AuthGateway, HttpAuthGateway};
use crate::monitor::{ActiveNamespace, ExpiryMonitor, MonitorHandle};
use crate::namespace::Namespace;
use crate::session_store::SessionStore;
use crate::types::{RefreshOrigin, Session};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::config::{SessionConfig, SessionTimings};
use core_runtime::events::{EventBus, Receiver, SessionEvent};
use core_runtime::logging::redact_if_sensitive;
use std::sync::{Arc, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Timing and clock used by a [`SessionManager`].
#[derive(Clone)]
pub struct SessionSettings {
    pub timings: SessionTimings,
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timings: SessionTimings::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            timings: config.timings,
            clock: config.clock.clone(),
        }
    }
}

/// Client-side session and token lifecycle manager.
pub struct SessionManager {
    store: SessionStore,
    gateway: Arc<dyn AuthGateway>,
    event_bus: EventBus,
    coordinator: RefreshCoordinator,
    evaluator: ExpiryEvaluator,
    active: ActiveNamespace,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        store: SessionStore,
        gateway: Arc<dyn AuthGateway>,
        event_bus: EventBus,
        settings: SessionSettings,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            gateway.clone(),
            event_bus.clone(),
            settings.timings.refresh_timeout,
        );
        let evaluator =
            ExpiryEvaluator::new(settings.timings.refresh_lead_time, settings.clock.clone());

        let manager = Self {
            store,
            gateway,
            event_bus,
            coordinator,
            evaluator,
            active: Arc::new(RwLock::new(None)),
            settings,
        };
        manager.install_expiry_handler(None);
        manager
    }

    /// Build a manager talking to the configured gateway over HTTP.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            SessionStore::new(config.key_value_store.clone()),
            Arc::new(HttpAuthGateway::from_config(config)),
            EventBus::new(config.event_buffer_size),
            SessionSettings::from(config),
        ))
    }

    /// Call `handler` whenever a background refresh failure signs the user
    /// out. The handler runs after the session has been cleared.
    pub fn with_expiry_handler<H>(self, handler: H) -> Self
    where
        H: SessionExpiredHandler + 'static,
    {
        self.install_expiry_handler(Some(Arc::new(handler)));
        self
    }

    fn install_expiry_handler(&self, host: Option<Arc<dyn SessionExpiredHandler>>) {
        let active = self.active.clone();
        self.coordinator
            .set_expired_handler(Arc::new(move |expired: &SessionExpired| {
                {
                    let mut active = active.write().unwrap_or_else(|e| e.into_inner());
                    if *active == Some(expired.namespace) {
                        *active = None;
                    }
                }
                if let Some(host) = &host {
                    host.on_session_expired(expired);
                }
            }));
    }

    /// Sign in and make the resulting namespace active.
    ///
    /// Any pair already stored under that namespace is replaced.
    #[instrument(skip(self, identifier, secret), fields(identifier = %redact_if_sensitive("identifier", identifier)))]
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Session> {
        info!("Signing in");
        let response = timeout(
            self.settings.timings.refresh_timeout,
            self.gateway.login(identifier, secret),
        )
        .await
        .map_err(|_| AuthError::OperationTimeout {
            operation: "Login".to_string(),
        })??;

        let namespace = response.claims.namespace();
        self.store.clear(namespace)?;
        self.store.save(namespace, &response.tokens)?;
        self.set_active(Some(namespace));

        info!(namespace = %namespace, "Sign-in completed");
        let _ = self.event_bus.emit(SessionEvent::SignedIn {
            namespace: namespace.to_string(),
            roles: response.claims.roles.clone(),
        });

        Ok(Session::new(namespace, response.tokens))
    }

    /// End the session stored under `namespace`.
    ///
    /// The gateway is told first; if that fails the local session is cleared
    /// anyway.
    #[instrument(skip_all, fields(namespace = %namespace))]
    pub async fn logout(&self, namespace: Namespace) -> Result<()> {
        info!("Signing out");
        if let Some(tokens) = self.store.load(namespace)? {
            match timeout(
                self.settings.timings.refresh_timeout,
                self.gateway.logout(&tokens),
            )
            .await
            {
                Ok(Ok(())) => debug!("Gateway session ended"),
                Ok(Err(e)) => warn!(error = %e, "Gateway logout failed, clearing local session"),
                Err(_) => warn!("Gateway logout timed out, clearing local session"),
            }
        }

        self.store.clear(namespace)?;
        {
            let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
            if *active == Some(namespace) {
                *active = None;
            }
        }

        let _ = self.event_bus.emit(SessionEvent::SignedOut {
            namespace: namespace.to_string(),
        });
        info!("Sign-out completed");
        Ok(())
    }

    /// Adopt the first complete stored session, in namespace precedence
    /// order, as the active one.
    pub fn restore(&self) -> Result<Option<Session>> {
        for namespace in Namespace::ALL {
            if let Some(session) = self.store.session(namespace)? {
                info!(namespace = %namespace, "Restored stored session");
                self.set_active(Some(namespace));
                return Ok(Some(session));
            }
        }
        debug!("No stored session to restore");
        Ok(None)
    }

    /// Refresh on behalf of a request that needs a valid token. A fatal
    /// failure signs the user out.
    pub async fn request_refresh(&self, namespace: Namespace) -> Result<String> {
        self.coordinator
            .request_refresh(namespace, RefreshOrigin::Middleware)
            .await
    }

    /// User-initiated refresh. Failures are returned and the session is kept.
    pub async fn refresh_now(&self, namespace: Namespace) -> Result<String> {
        self.coordinator
            .request_refresh(namespace, RefreshOrigin::Manual)
            .await
    }

    /// Access token of the active session, refreshed first when stale.
    pub async fn valid_access_token(&self) -> Result<String> {
        let namespace = self.active_namespace().ok_or(AuthError::NotAuthenticated)?;
        let tokens = self
            .store
            .load(namespace)?
            .ok_or(AuthError::NotAuthenticated)?;

        if self.evaluator.is_stale(&tokens.access_token) {
            debug!(namespace = %namespace, "Access token stale, refreshing before use");
            return self.request_refresh(namespace).await;
        }
        Ok(tokens.access_token)
    }

    pub fn active_namespace(&self) -> Option<Namespace> {
        *self.active.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_session(&self) -> Result<Option<Session>> {
        match self.active_namespace() {
            Some(namespace) => self.store.session(namespace),
            None => Ok(None),
        }
    }

    /// Claims of the active access token.
    pub fn claims(&self) -> Result<Option<Claims>> {
        self.current_session()?
            .map(|session| Claims::decode(session.access_token()))
            .transpose()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.event_bus.subscribe()
    }

    /// Start polling the active session. Keep the handle alive for as long as
    /// the monitor should run.
    pub fn start_monitor(&self) -> MonitorHandle {
        ExpiryMonitor::new(
            self.store.clone(),
            self.coordinator.clone(),
            self.evaluator.clone(),
            self.active.clone(),
            self.settings.timings.poll_interval,
        )
        .start()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    fn set_active(&self, namespace: Option<Namespace>) {
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = namespace;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::tests::encode_jwt;
    use crate::types::{LoginResponse, RefreshedTokens, TokenPair};
    use async_trait::async_trait;
    use bridge_desktop::MemoryKeyValueStore;
    use bridge_traits::storage::KeyValueStore;
    use bridge_traits::time::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const NOW: i64 = 1_700_000_000;

    fn access(roles: &[&str], expires_in: i64) -> String {
        encode_jwt(&json!({ "roles": roles, "exp": NOW + expires_in }))
    }

    struct ScriptedGateway {
        roles: Vec<&'static str>,
        refresh: Mutex<Result<RefreshedTokens>>,
        refreshes: AtomicUsize,
        logouts: AtomicUsize,
        logout_fails: bool,
    }

    impl ScriptedGateway {
        fn new(roles: &[&'static str]) -> Self {
            Self {
                roles: roles.to_vec(),
                refresh: Mutex::new(Ok(RefreshedTokens {
                    access_token: access(roles, 3600),
                    refresh_token: None,
                })),
                refreshes: AtomicUsize::new(0),
                logouts: AtomicUsize::new(0),
                logout_fails: false,
            }
        }
    }

    #[async_trait]
    impl AuthGateway for ScriptedGateway {
        async fn login(&self, _identifier: &str, secret: &str) -> Result<LoginResponse> {
            if secret != "pw" {
                return Err(AuthError::AuthRejected {
                    status: Some(401),
                    reason: "Invalid credentials".to_string(),
                });
            }
            let token = access(&self.roles, 3600);
            Ok(LoginResponse {
                claims: Claims::decode(&token)?,
                tokens: TokenPair::new(token, "refresh-1"),
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedTokens> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.refresh.lock().unwrap().clone()
        }

        async fn logout(&self, _tokens: &TokenPair) -> Result<()> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            if self.logout_fails {
                return Err(AuthError::NetworkFailure("offline".to_string()));
            }
            Ok(())
        }
    }

    fn manager(gateway: Arc<ScriptedGateway>) -> (Arc<MemoryKeyValueStore>, SessionManager) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let settings = SessionSettings {
            timings: SessionTimings::default(),
            clock: Arc::new(ManualClock::at_unix(NOW)),
        };
        let manager = SessionManager::new(
            SessionStore::new(kv.clone()),
            gateway,
            EventBus::new(32),
            settings,
        );
        (kv, manager)
    }

    #[tokio::test]
    async fn test_login_routes_to_role_namespace() {
        let (kv, manager) = manager(Arc::new(ScriptedGateway::new(&["PHARMACIST"])));
        let mut events = manager.subscribe();

        let session = manager.login("rx@clinic", "pw").await.unwrap();

        assert_eq!(session.namespace, Namespace::Pharmacy);
        assert_eq!(manager.active_namespace(), Some(Namespace::Pharmacy));
        assert_eq!(
            kv.keys().unwrap().into_iter().collect::<std::collections::BTreeSet<_>>(),
            ["pharmacyAccessToken", "pharmacyRefreshToken"]
                .into_iter()
                .map(String::from)
                .collect()
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::SignedIn {
                namespace: "pharmacy".to_string(),
                roles: vec!["PHARMACIST".to_string()],
            }
        );
        assert_eq!(
            manager.claims().unwrap().unwrap().roles,
            vec!["PHARMACIST".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejected_login_stores_nothing() {
        let (kv, manager) = manager(Arc::new(ScriptedGateway::new(&["HR"])));

        let err = manager.login("hr@clinic", "wrong").await.unwrap_err();

        assert!(matches!(err, AuthError::AuthRejected { .. }));
        assert!(kv.keys().unwrap().is_empty());
        assert_eq!(manager.active_namespace(), None);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_gateway_fails() {
        let mut gateway = ScriptedGateway::new(&["CASHIER"]);
        gateway.logout_fails = true;
        let gateway = Arc::new(gateway);
        let (kv, manager) = manager(gateway.clone());
        manager.login("cashier", "pw").await.unwrap();

        manager.logout(Namespace::Finance).await.unwrap();

        assert_eq!(gateway.logouts.load(Ordering::SeqCst), 1);
        assert!(kv.keys().unwrap().is_empty());
        assert_eq!(manager.active_namespace(), None);
        assert_eq!(manager.current_session().unwrap(), None);
    }

    #[tokio::test]
    async fn test_logout_of_empty_namespace_skips_gateway() {
        let gateway = Arc::new(ScriptedGateway::new(&["HR"]));
        let (_, manager) = manager(gateway.clone());

        manager.logout(Namespace::Lab).await.unwrap();
        assert_eq!(gateway.logouts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_restore_follows_namespace_precedence() {
        let (_, manager) = manager(Arc::new(ScriptedGateway::new(&["HR"])));
        let store = manager.store().clone();
        store
            .save(Namespace::Staff, &TokenPair::new("s", "sr"))
            .unwrap();
        store
            .save(Namespace::Lab, &TokenPair::new("l", "lr"))
            .unwrap();

        let restored = manager.restore().unwrap().unwrap();
        assert_eq!(restored.namespace, Namespace::Lab);
        assert_eq!(manager.active_namespace(), Some(Namespace::Lab));
    }

    #[test]
    fn test_restore_with_nothing_stored() {
        let (_, manager) = manager(Arc::new(ScriptedGateway::new(&["HR"])));
        assert_eq!(manager.restore().unwrap(), None);
        assert_eq!(manager.active_namespace(), None);
    }

    #[tokio::test]
    async fn test_valid_access_token_only_refreshes_when_stale() {
        let gateway = Arc::new(ScriptedGateway::new(&["LAB_TECH"]));
        let (_, manager) = manager(gateway.clone());

        assert_eq!(
            manager.valid_access_token().await,
            Err(AuthError::NotAuthenticated)
        );

        let session = manager.login("lab", "pw").await.unwrap();
        assert_eq!(
            manager.valid_access_token().await.unwrap(),
            session.access_token()
        );
        assert_eq!(gateway.refreshes.load(Ordering::SeqCst), 0);

        manager
            .store()
            .save_access_token(Namespace::Lab, &access(&["LAB_TECH"], 120))
            .unwrap();
        let token = manager.valid_access_token().await.unwrap();
        assert_eq!(token, access(&["LAB_TECH"], 3600));
        assert_eq!(gateway.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_drops_active_namespace_and_calls_handler() {
        let gateway = ScriptedGateway::new(&["HR"]);
        *gateway.refresh.lock().unwrap() = Err(AuthError::AuthRejected {
            status: Some(401),
            reason: "revoked".to_string(),
        });
        let (_, manager) = manager(Arc::new(gateway));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let manager = manager.with_expiry_handler(move |expired: &SessionExpired| {
            sink.lock().unwrap().push(expired.namespace);
        });
        manager.login("hr", "pw").await.unwrap();

        let err = manager.request_refresh(Namespace::Hr).await.unwrap_err();

        assert!(matches!(err, AuthError::AuthRejected { .. }));
        assert_eq!(*seen.lock().unwrap(), vec![Namespace::Hr]);
        assert_eq!(manager.active_namespace(), None);
        assert_eq!(manager.store().load(Namespace::Hr).unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_now_failure_keeps_session() {
        let gateway = ScriptedGateway::new(&["HR"]);
        *gateway.refresh.lock().unwrap() =
            Err(AuthError::NetworkFailure("connection reset".to_string()));
        let (_, manager) = manager(Arc::new(gateway));
        manager.login("hr", "pw").await.unwrap();

        assert!(manager.refresh_now(Namespace::Hr).await.is_err());
        assert_eq!(manager.active_namespace(), Some(Namespace::Hr));
        assert!(manager.current_session().unwrap().is_some());
    }
}

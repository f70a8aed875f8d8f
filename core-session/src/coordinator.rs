//! Refresh Coordinator
//!
//! Single-flight token refresh. However many callers ask for a refresh while
//! one is outstanding, the auth gateway sees exactly one request and every
//! caller receives the same outcome.
//!
//! ## States
//!
//! ```text
//!            request_refresh(ns)
//!   ┌──────┐ ─────────────────────> ┌─────────────────────────────┐
//!   │ Idle │                        │ Refreshing { ns, waiters }  │
//!   └──────┘ <───────────────────── └─────────────────────────────┘
//!            flight settles waiters
//! ```
//!
//! The check-and-set happens under a `std::sync::Mutex` that is never held
//! across an `.await`. The network call runs in a spawned task, so a caller
//! that gives up waiting does not cancel the refresh for everybody else.
//!
//! A request for a different namespace than the one in flight waits for the
//! slot to become idle and then starts its own flight.

use crate::claims::Claims;
use crate::error::{AuthError, Result};
use crate::gateway::AuthGateway;
use crate::namespace::Namespace;
use crate::session_store::SessionStore;
use crate::types::RefreshOrigin;
use core_runtime::events::{EventBus, SessionEvent};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::{futures::Notified, oneshot, Notify};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Details handed to a [`SessionExpiredHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExpired {
    pub namespace: Namespace,
    /// The refresh failure that ended the session.
    pub reason: AuthError,
}

/// Host hook invoked once per forced sign-out.
///
/// Runs on the refresh task after the session has been cleared and every
/// waiting caller has been answered. Implementations should hand off
/// anything slow. A panic is caught and logged.
pub trait SessionExpiredHandler: Send + Sync {
    fn on_session_expired(&self, expired: &SessionExpired);
}

impl<F> SessionExpiredHandler for F
where
    F: Fn(&SessionExpired) + Send + Sync,
{
    fn on_session_expired(&self, expired: &SessionExpired) {
        self(expired)
    }
}

type Waiter = oneshot::Sender<Result<String>>;

enum FlightState {
    Idle,
    Refreshing {
        namespace: Namespace,
        /// Set when any caller of this flight came from a background origin.
        expire_on_failure: bool,
        waiters: Vec<Waiter>,
    },
}

enum Admission<'a> {
    Started(oneshot::Receiver<Result<String>>),
    Joined(oneshot::Receiver<Result<String>>),
    Busy(Namespace, Notified<'a>),
}

struct Inner {
    store: SessionStore,
    gateway: Arc<dyn AuthGateway>,
    event_bus: EventBus,
    refresh_timeout: Duration,
    state: Mutex<FlightState>,
    idle: Notify,
    expired_handler: RwLock<Option<Arc<dyn SessionExpiredHandler>>>,
}

/// Single-flight refresh engine. Clones share the same state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: SessionStore,
        gateway: Arc<dyn AuthGateway>,
        event_bus: EventBus,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                event_bus,
                refresh_timeout,
                state: Mutex::new(FlightState::Idle),
                idle: Notify::new(),
                expired_handler: RwLock::new(None),
            }),
        }
    }

    /// Install the hook called when a failed refresh ends a session.
    /// Replaces any previous handler.
    pub fn set_expired_handler(&self, handler: Arc<dyn SessionExpiredHandler>) {
        let mut slot = self
            .inner
            .expired_handler
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(handler);
    }

    /// Namespace of the refresh currently in flight, if any.
    pub fn in_flight(&self) -> Option<Namespace> {
        match &*self.inner.lock_state() {
            FlightState::Idle => None,
            FlightState::Refreshing { namespace, .. } => Some(*namespace),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight().is_some()
    }

    /// Refresh the access token of `namespace`, joining an outstanding
    /// refresh of the same namespace instead of starting another one.
    ///
    /// Returns the new access token. Every caller of one flight observes
    /// the same token or the same error.
    pub async fn request_refresh(
        &self,
        namespace: Namespace,
        origin: RefreshOrigin,
    ) -> Result<String> {
        loop {
            match self.admit(namespace, origin) {
                Admission::Started(rx) => {
                    let inner = self.inner.clone();
                    tokio::spawn(async move { inner.fly(namespace, origin).await });
                    return settle(rx).await;
                }
                Admission::Joined(rx) => return settle(rx).await,
                Admission::Busy(current, idle) => {
                    debug!(
                        namespace = %namespace,
                        in_flight = %current,
                        "Waiting for refresh of another namespace"
                    );
                    idle.await;
                }
            }
        }
    }

    fn admit(&self, namespace: Namespace, origin: RefreshOrigin) -> Admission<'_> {
        let mut state = self.inner.lock_state();
        if let FlightState::Refreshing {
            namespace: current,
            expire_on_failure,
            waiters,
        } = &mut *state
        {
            if *current != namespace {
                return Admission::Busy(*current, self.inner.idle.notified());
            }
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            *expire_on_failure |= origin.expires_session_on_failure();
            debug!(namespace = %namespace, waiters = waiters.len(), "Joined in-flight refresh");
            return Admission::Joined(rx);
        }

        let (tx, rx) = oneshot::channel();
        *state = FlightState::Refreshing {
            namespace,
            expire_on_failure: origin.expires_session_on_failure(),
            waiters: vec![tx],
        };
        Admission::Started(rx)
    }
}

async fn settle(rx: oneshot::Receiver<Result<String>>) -> Result<String> {
    rx.await.unwrap_or(Err(AuthError::RefreshInterrupted))
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_bus.emit(event);
    }

    #[instrument(skip_all, fields(namespace = %namespace, origin = %origin))]
    async fn fly(&self, namespace: Namespace, origin: RefreshOrigin) {
        let outcome = self.exchange(namespace, origin).await;

        let ended = match &outcome {
            Ok(_) => false,
            // no usable session to begin with
            Err(AuthError::StorageIncomplete { .. } | AuthError::NotAuthenticated) => true,
            Err(e) => e.is_session_fatal() && self.expire_on_failure(),
        };
        let expired = match &outcome {
            Err(e) if ended && e.is_session_fatal() => Some(SessionExpired {
                namespace,
                reason: e.clone(),
            }),
            _ => None,
        };

        if let Err(e) = &outcome {
            self.emit(SessionEvent::RefreshFailed {
                namespace: namespace.to_string(),
                message: e.to_string(),
                recoverable: !ended,
            });
        }
        if let Some(expired) = &expired {
            self.end_session(expired);
        }

        let waiters = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, FlightState::Idle) {
                FlightState::Refreshing { waiters, .. } => waiters,
                FlightState::Idle => Vec::new(),
            }
        };
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Settling refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        self.idle.notify_waiters();

        if let Some(expired) = &expired {
            self.call_expired_handler(expired);
        }
    }

    fn expire_on_failure(&self) -> bool {
        match &*self.lock_state() {
            FlightState::Refreshing {
                expire_on_failure, ..
            } => *expire_on_failure,
            FlightState::Idle => false,
        }
    }

    async fn exchange(&self, namespace: Namespace, origin: RefreshOrigin) -> Result<String> {
        let tokens = match self.store.require(namespace) {
            Ok(tokens) => tokens,
            Err(e @ AuthError::StorageIncomplete { .. }) => {
                warn!("Stored session is incomplete, discarding it");
                if let Err(clear_err) = self.store.clear(namespace) {
                    warn!(error = %clear_err, "Failed to discard incomplete session");
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.emit(SessionEvent::RefreshStarted {
            namespace: namespace.to_string(),
            origin: origin.to_string(),
        });
        info!("Refreshing access token");

        let response = timeout(
            self.refresh_timeout,
            self.gateway.refresh(&tokens.refresh_token),
        )
        .await;

        if let Some(current) = self.superseded(namespace, &tokens.refresh_token) {
            return current;
        }

        let refreshed = match response {
            Ok(Ok(refreshed)) => refreshed,
            Ok(Err(e)) => {
                error!(error = %e, "Token refresh failed");
                return Err(e);
            }
            Err(_) => {
                error!(timeout = ?self.refresh_timeout, "Token refresh timed out");
                return Err(AuthError::OperationTimeout {
                    operation: "Token refresh".to_string(),
                });
            }
        };

        let pair = refreshed.into_pair(&tokens.refresh_token);
        self.store.save(namespace, &pair)?;

        let expires_at = Claims::decode(&pair.access_token)
            .ok()
            .map(|claims| claims.expires_at);
        info!(expires_at, "Access token refreshed");
        self.emit(SessionEvent::TokenRefreshed {
            namespace: namespace.to_string(),
            expires_at,
        });

        Ok(pair.access_token)
    }

    /// The outcome to report instead of the gateway's when the stored
    /// session no longer holds the refresh token that was sent, e.g. after
    /// a sign-in or sign-out completed while the request was out.
    fn superseded(&self, namespace: Namespace, sent: &str) -> Option<Result<String>> {
        match self.store.load(namespace) {
            Ok(Some(pair)) if pair.refresh_token == sent => None,
            Ok(Some(pair)) => {
                info!("Session was replaced during refresh, discarding the refresh outcome");
                Some(Ok(pair.access_token))
            }
            Ok(None) => {
                info!("Session was removed during refresh, discarding the refresh outcome");
                Some(Err(AuthError::NotAuthenticated))
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn end_session(&self, expired: &SessionExpired) {
        if let Err(e) = self.store.clear(expired.namespace) {
            error!(error = %e, "Failed to clear expired session");
        }
        warn!(reason = %expired.reason, "Session expired, sign-in required");

        self.emit(SessionEvent::SessionExpired {
            namespace: expired.namespace.to_string(),
            reason: expired.reason.to_string(),
        });
    }

    fn call_expired_handler(&self, expired: &SessionExpired) {
        let handler = self
            .expired_handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(handler) = handler else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| handler.on_session_expired(expired))).is_err() {
            error!(namespace = %expired.namespace, "Session expired handler panicked");
        }
    }
}

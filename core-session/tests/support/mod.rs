//! Shared helpers for the session integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_desktop::MemoryKeyValueStore;
use bridge_traits::time::ManualClock;
use core_runtime::config::SessionTimings;
use core_runtime::events::EventBus;
use core_session::{
    AuthError, AuthGateway, Claims, LoginResponse, RefreshedTokens, Result, SessionExpired,
    SessionExpiredHandler, SessionManager, SessionSettings, SessionStore, TokenPair,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const NOW: i64 = 1_700_000_000;

/// Unsigned JWT carrying `roles` and an `exp` relative to [`NOW`].
pub fn mint_jwt(roles: &[&str], expires_in: i64) -> String {
    let segment = |value: serde_json::Value| URL_SAFE_NO_PAD.encode(value.to_string());
    format!(
        "{}.{}.{}",
        segment(json!({ "alg": "none", "typ": "JWT" })),
        segment(json!({ "sub": "user-1", "roles": roles, "exp": NOW + expires_in })),
        URL_SAFE_NO_PAD.encode("signature")
    )
}

/// Auth gateway double.
///
/// Logins succeed for any identifier with password `pw` and carry `roles`.
/// The n-th login issues refresh token `session-n`.
/// Refreshes return `refresh_outcome`; while `hold` is set they block until
/// [`FakeGateway::release`] is called.
pub struct FakeGateway {
    pub roles: Vec<String>,
    pub refresh_outcome: Mutex<Result<RefreshedTokens>>,
    pub logins: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub refresh_tokens_seen: Mutex<Vec<String>>,
    pub hold: bool,
    gate: Notify,
}

impl FakeGateway {
    pub fn new(roles: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|r| r.to_string()).collect(),
            refresh_outcome: Mutex::new(Ok(RefreshedTokens {
                access_token: mint_jwt(roles, 3600),
                refresh_token: Some("refresh-2".to_string()),
            })),
            logins: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            hold: false,
            gate: Notify::new(),
        }
    }

    pub fn holding(mut self) -> Self {
        self.hold = true;
        self
    }

    pub fn failing_with(self, error: AuthError) -> Self {
        *self.refresh_outcome.lock().unwrap() = Err(error);
        self
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_refresh_calls(&self, n: usize) {
        while self.refresh_calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl AuthGateway for FakeGateway {
    async fn login(&self, _identifier: &str, secret: &str) -> Result<LoginResponse> {
        if secret != "pw" {
            return Err(AuthError::AuthRejected {
                status: Some(401),
                reason: "Invalid credentials".to_string(),
            });
        }
        let roles: Vec<&str> = self.roles.iter().map(String::as_str).collect();
        let access = mint_jwt(&roles, 3600);
        let serial = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(LoginResponse {
            claims: Claims::decode(&access)?,
            tokens: TokenPair::new(access, format!("session-{serial}")),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        if self.hold {
            self.gate.notified().await;
        }
        self.refresh_outcome.lock().unwrap().clone()
    }

    async fn logout(&self, _tokens: &TokenPair) -> Result<()> {
        Ok(())
    }
}

/// Expiry handler that records every call.
#[derive(Default)]
pub struct RecordingHandler {
    pub calls: Mutex<Vec<SessionExpired>>,
}

impl RecordingHandler {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl SessionExpiredHandler for RecordingHandler {
    fn on_session_expired(&self, expired: &SessionExpired) {
        self.calls.lock().unwrap().push(expired.clone());
    }
}

pub struct Harness {
    pub kv: Arc<MemoryKeyValueStore>,
    pub gateway: Arc<FakeGateway>,
    pub handler: Arc<RecordingHandler>,
    pub manager: SessionManager,
}

/// Manager over an in-memory store with the clock pinned at [`NOW`].
pub fn harness(gateway: FakeGateway) -> Harness {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let gateway = Arc::new(gateway);
    let handler = Arc::new(RecordingHandler::default());

    let settings = SessionSettings {
        timings: SessionTimings {
            refresh_lead_time: Duration::from_secs(300),
            poll_interval: Duration::from_secs(60),
            refresh_timeout: Duration::from_secs(30),
        },
        clock: Arc::new(ManualClock::at_unix(NOW)),
    };

    let forward = handler.clone();
    let manager = SessionManager::new(
        SessionStore::new(kv.clone()),
        gateway.clone(),
        EventBus::new(64),
        settings,
    )
    .with_expiry_handler(move |expired: &SessionExpired| forward.on_session_expired(expired));

    Harness {
        kv,
        gateway,
        handler,
        manager,
    }
}

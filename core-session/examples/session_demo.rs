//! Walks through a session lifecycle against an in-process auth service.
//!
//! Run with `RUST_LOG=core_session=debug` to watch the refresh flow.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_desktop::MemoryKeyValueStore;
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::config::SessionTimings;
use core_runtime::events::EventBus;
use core_runtime::logging::{fingerprint, init_logging, LogFormat, LoggingConfig};
use core_session::{
    AuthError, AuthGateway, Claims, LoginResponse, RefreshedTokens, SessionExpired,
    SessionManager, SessionSettings, SessionStore, TokenPair,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Issues short-lived tokens so the monitor has something to do.
struct DemoAuthService {
    issued: AtomicU64,
    lifetime_secs: i64,
}

impl DemoAuthService {
    fn issue(&self, roles: &[&str]) -> String {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst);
        let exp = SystemClock.unix_timestamp() + self.lifetime_secs;
        let segment = |value: serde_json::Value| URL_SAFE_NO_PAD.encode(value.to_string());
        format!(
            "{}.{}.{}",
            segment(json!({ "alg": "none" })),
            segment(json!({ "sub": "demo", "roles": roles, "exp": exp, "jti": serial })),
            URL_SAFE_NO_PAD.encode("demo")
        )
    }
}

#[async_trait]
impl AuthGateway for DemoAuthService {
    async fn login(&self, identifier: &str, secret: &str) -> core_session::Result<LoginResponse> {
        if secret.is_empty() {
            return Err(AuthError::AuthRejected {
                status: Some(401),
                reason: "Missing password".to_string(),
            });
        }
        let role = if identifier.starts_with("rx") {
            "PHARMACIST"
        } else {
            "PATIENT"
        };
        let access = self.issue(&[role]);
        Ok(LoginResponse {
            claims: Claims::decode(&access)?,
            tokens: TokenPair::new(access, format!("refresh-{}", identifier)),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> core_session::Result<RefreshedTokens> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(RefreshedTokens {
            access_token: self.issue(&["PHARMACIST"]),
            refresh_token: None,
        })
    }

    async fn logout(&self, _tokens: &TokenPair) -> core_session::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let settings = SessionSettings {
        timings: SessionTimings {
            refresh_lead_time: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            refresh_timeout: Duration::from_secs(5),
        },
        ..SessionSettings::default()
    };
    let gateway = Arc::new(DemoAuthService {
        issued: AtomicU64::new(0),
        lifetime_secs: 7,
    });

    let manager = SessionManager::new(
        SessionStore::new(Arc::new(MemoryKeyValueStore::new())),
        gateway,
        EventBus::new(64),
        settings,
    )
    .with_expiry_handler(|expired: &SessionExpired| {
        println!("session for {} ended: {}", expired.namespace, expired.reason);
    });

    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[{:?}] {} ({})", event.severity(), event.description(), event.namespace());
        }
    });

    let session = manager
        .login("rx-demo", "secret")
        .await
        .context("login failed")?;
    println!(
        "signed in to {} with token {}",
        session.namespace,
        fingerprint(session.access_token())
    );

    let monitor = manager.start_monitor();

    let concurrent = futures::future::join_all(
        (0..5).map(|_| manager.request_refresh(session.namespace)),
    )
    .await;
    let tokens: Vec<_> = concurrent.into_iter().collect::<Result<_, _>>()?;
    println!(
        "{} concurrent callers received {}",
        tokens.len(),
        fingerprint(&tokens[0])
    );

    tokio::time::sleep(Duration::from_secs(4)).await;
    let token = manager.valid_access_token().await?;
    println!("token after monitor pass: {}", fingerprint(&token));

    monitor.shutdown().await;
    manager.logout(session.namespace).await?;
    println!("active namespace after logout: {:?}", manager.active_namespace());
    Ok(())
}

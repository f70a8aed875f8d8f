//! Expiry Monitor
//!
//! Background task that polls the active session and asks the
//! [`RefreshCoordinator`] for a new access token before the current one
//! runs out.

use crate::coordinator::RefreshCoordinator;
use crate::expiry::ExpiryEvaluator;
use crate::namespace::Namespace;
use crate::session_store::SessionStore;
use crate::types::RefreshOrigin;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Namespace the monitor watches, shared with the session manager.
pub type ActiveNamespace = Arc<RwLock<Option<Namespace>>>;

pub struct ExpiryMonitor {
    store: SessionStore,
    coordinator: RefreshCoordinator,
    evaluator: ExpiryEvaluator,
    active: ActiveNamespace,
    poll_interval: Duration,
}

impl ExpiryMonitor {
    pub fn new(
        store: SessionStore,
        coordinator: RefreshCoordinator,
        evaluator: ExpiryEvaluator,
        active: ActiveNamespace,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            coordinator,
            evaluator,
            active,
            poll_interval,
        }
    }

    /// Spawn the polling task. The first check runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(poll_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?poll_interval, "Expiry monitor started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {}
                }
                self.check();
            }

            info!("Expiry monitor stopped");
        });

        MonitorHandle {
            cancel,
            task: Some(task),
        }
    }

    /// One poll. Returns the namespace a refresh was requested for.
    pub(crate) fn check(&self) -> Option<Namespace> {
        let namespace = (*self.active.read().unwrap_or_else(|e| e.into_inner()))?;

        let tokens = match self.store.load(namespace) {
            Ok(Some(tokens)) => tokens,
            Ok(None) => return None,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Expiry check could not read session");
                return None;
            }
        };

        if !self.evaluator.is_stale(&tokens.access_token) {
            return None;
        }
        if self.coordinator.in_flight() == Some(namespace) {
            debug!(namespace = %namespace, "Refresh already in flight");
            return None;
        }

        debug!(namespace = %namespace, "Access token is stale, requesting refresh");
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator
                .request_refresh(namespace, RefreshOrigin::Monitor)
                .await
            {
                debug!(namespace = %namespace, error = %e, "Background refresh failed");
            }
        });
        Some(namespace)
    }
}

/// Owns the monitor task. Dropping the handle stops the monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop future ticks. A refresh already requested still completes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

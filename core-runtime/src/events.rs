//! # Event Bus System
//!
//! Broadcasts session lifecycle events to any interested part of the host
//! application using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`SessionEvent`] describes sign-in, refresh and expiry
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ```text
//! ┌──────────────────┐  emit   ┌───────────┐  subscribe  ┌──────────────┐
//! │ Session manager  ├────────>│           ├────────────>│ UI / router  │
//! └──────────────────┘         │ EventBus  │             └──────────────┘
//! ┌──────────────────┐  emit   │           │  subscribe  ┌──────────────┐
//! │ Refresh flight   ├────────>│           ├────────────>│ Audit logger │
//! └──────────────────┘         └───────────┘             └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, SessionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut events = event_bus.subscribe();
//!
//! event_bus.emit(SessionEvent::SignedOut {
//!     namespace: "lab".to_string(),
//! }).ok();
//!
//! let event = events.recv().await.unwrap();
//! assert_eq!(event.namespace(), "lab");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! Emitting with no subscribers returns `Err(SendError)`; publishers in this
//! workspace ignore that result.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Session Events
// ============================================================================

/// Events emitted over the lifetime of a credential namespace.
///
/// Namespaces travel as their stable identifier (`"staff"`, `"lab"`, ...)
/// so subscribers do not need to depend on the session crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A login stored a fresh token pair.
    SignedIn {
        namespace: String,
        /// Roles carried by the access token at login.
        roles: Vec<String>,
    },
    /// The namespace was cleared on request.
    SignedOut { namespace: String },
    /// A refresh network call started.
    RefreshStarted {
        namespace: String,
        /// What asked for the refresh (`monitor`, `middleware`, `manual`).
        origin: String,
    },
    /// A refresh completed and the new pair was stored.
    TokenRefreshed {
        namespace: String,
        /// Expiry of the new access token (Unix epoch seconds), if decodable.
        expires_at: Option<i64>,
    },
    /// A refresh failed.
    RefreshFailed {
        namespace: String,
        message: String,
        /// Whether the session survived the failure.
        recoverable: bool,
    },
    /// The session was discarded and the user has to sign in again.
    SessionExpired { namespace: String, reason: String },
}

impl SessionEvent {
    /// Identifier of the namespace the event is about.
    pub fn namespace(&self) -> &str {
        match self {
            SessionEvent::SignedIn { namespace, .. }
            | SessionEvent::SignedOut { namespace }
            | SessionEvent::RefreshStarted { namespace, .. }
            | SessionEvent::TokenRefreshed { namespace, .. }
            | SessionEvent::RefreshFailed { namespace, .. }
            | SessionEvent::SessionExpired { namespace, .. } => namespace,
        }
    }

    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            SessionEvent::SignedIn { .. } => "User signed in",
            SessionEvent::SignedOut { .. } => "User signed out",
            SessionEvent::RefreshStarted { .. } => "Refreshing access token",
            SessionEvent::TokenRefreshed { .. } => "Access token refreshed",
            SessionEvent::RefreshFailed { .. } => "Token refresh failed",
            SessionEvent::SessionExpired { .. } => "Session expired, sign-in required",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            SessionEvent::SessionExpired { .. } => EventSeverity::Error,
            SessionEvent::RefreshFailed {
                recoverable: true, ..
            } => EventSeverity::Warning,
            SessionEvent::RefreshFailed { .. } => EventSeverity::Error,
            SessionEvent::SignedIn { .. } | SessionEvent::SignedOut { .. } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus yields another handle onto the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if nobody is listening.
    pub fn emit(&self, event: SessionEvent) -> Result<usize, SendError<SessionEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(16);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&SessionEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, SessionEvent};
///
/// let event_bus = EventBus::new(16);
/// let expiries = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, SessionEvent::SessionExpired { .. }));
/// ```
pub struct EventStream {
    receiver: Receiver<SessionEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<SessionEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Restrict the stream to a single namespace.
    pub fn for_namespace(self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.filter(move |event| event.namespace() == namespace)
    }

    fn accepts(&self, event: &SessionEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<SessionEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<SessionEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

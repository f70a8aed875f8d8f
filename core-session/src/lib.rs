//! # Session Module
//!
//! Client-side session and token lifecycle for the multi-role portal.
//!
//! ## Overview
//!
//! Each staff role keeps its credentials in its own namespace of the
//! origin-scoped key-value store. Access tokens are refreshed ahead of
//! expiry by a background monitor, and concurrent refresh requests collapse
//! into a single call to the auth service.
//!
//! ## Features
//!
//! - Role to namespace resolution with a fixed storage key table
//! - Both-or-neither token pair persistence
//! - Single-flight refresh with a shared outcome for every waiter
//! - Periodic expiry monitor with a cancel handle
//! - Session-expired events and a host-supplied expiry handler

pub mod claims;
pub mod coordinator;
pub mod error;
pub mod expiry;
pub mod gateway;
pub mod manager;
pub mod monitor;
pub mod namespace;
pub mod session_store;
pub mod types;

pub use claims::Claims;
pub use coordinator::{RefreshCoordinator, SessionExpired, SessionExpiredHandler};
pub use error::{AuthError, Result};
pub use expiry::ExpiryEvaluator;
pub use gateway::{AuthGateway, GatewayEndpoints, HttpAuthGateway};
pub use manager::{SessionManager, SessionSettings};
pub use monitor::{ExpiryMonitor, MonitorHandle};
pub use namespace::{Namespace, StorageKeys};
pub use session_store::SessionStore;
pub use types::{LoginResponse, RefreshOrigin, RefreshedTokens, Session, SlotState, TokenPair};

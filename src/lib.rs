//! Workspace facade crate.
//!
//! Re-exports the session core together with the runtime and bridge crates it
//! is configured with, so host applications can depend on `portal-session`
//! alone. The default `desktop-shims` feature also exposes the OS credential
//! store adapter and the reqwest HTTP client.

pub use bridge_traits as bridge;
pub use core_runtime as runtime;
pub use core_session as session;

pub use core_runtime::config::{SessionConfig, SessionConfigBuilder};
pub use core_runtime::events::{EventBus, SessionEvent};
pub use core_session::{
    AuthError, MonitorHandle, Namespace, RefreshOrigin, Session, SessionExpired,
    SessionExpiredHandler, SessionManager, TokenPair,
};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;

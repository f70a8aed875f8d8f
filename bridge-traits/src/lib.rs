//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host implements for the session
//! core.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP transport used by the auth gateway
//! - [`KeyValueStore`](storage::KeyValueStore) - Origin-scoped persistent string storage
//! - [`Clock`](time::Clock) - Time source for deterministic expiry checks
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | Tests    | in-memory store from `bridge-desktop`, `ManualClock` |
//!
//! ## Error Handling
//!
//! All bridge traits report failures through [`BridgeError`](error::BridgeError).
//! Implementations should convert platform errors into it with an actionable
//! message and keep credential values out of the message text.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared between the refresh task, the expiry monitor and request handlers.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::KeyValueStore;
pub use time::{Clock, ManualClock, SystemClock};

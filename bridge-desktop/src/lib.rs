//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest`
//! - `KeyValueStore` kept in the OS credential store, one service per
//!   application origin
//! - `KeyValueStore` held in memory, for tests and ephemeral sessions
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{KeyringKeyValueStore, ReqwestHttpClient};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let store = KeyringKeyValueStore::for_origin("https://portal.example.com");
//! ```

mod http;
mod store;

pub use http::ReqwestHttpClient;
pub use store::{KeyringKeyValueStore, MemoryKeyValueStore};

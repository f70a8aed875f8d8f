//! # Session Configuration
//!
//! Builder-style configuration for the session core with fail-fast
//! validation.
//!
//! ## Required Dependencies
//!
//! - `gateway_base_url` - Root URL of the authentication service
//! - `KeyValueStore` - Persistent, origin-scoped credential storage
//! - `HttpClient` - Transport for the auth gateway
//!
//! With the `desktop-shims` feature, an OS credential store for the
//! configured origin and a reqwest client are injected when none is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::builder()
//!     .gateway_base_url("https://auth.example.com/api/")
//!     .origin("https://portal.example.com")
//!     .poll_interval(Duration::from_secs(30))
//!     .build()?;
//! ```
//!
//! Missing capabilities produce [`Error::CapabilityMissing`] with a message
//! naming what to inject.

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, HttpClient, KeyValueStore, SystemClock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Refresh a token when less than this much lifetime remains.
pub const DEFAULT_REFRESH_LEAD_TIME: Duration = Duration::from_secs(5 * 60);

/// Interval between expiry checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound on a single refresh exchange.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Origin used when the host does not name one.
pub const DEFAULT_ORIGIN: &str = "default";

/// Timing knobs for token upkeep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub refresh_lead_time: Duration,
    pub poll_interval: Duration,
    pub refresh_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            refresh_lead_time: DEFAULT_REFRESH_LEAD_TIME,
            poll_interval: DEFAULT_POLL_INTERVAL,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

impl SessionTimings {
    /// Checks that every duration is usable.
    ///
    /// The poll interval may not exceed the lead time, otherwise a token
    /// could pass its refresh window between two checks and expire unseen.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_lead_time.is_zero() {
            return Err(Error::Config(
                "Refresh lead time must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "Poll interval must be greater than zero".to_string(),
            ));
        }
        if self.refresh_timeout.is_zero() {
            return Err(Error::Config(
                "Refresh timeout must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval > self.refresh_lead_time {
            return Err(Error::Config(format!(
                "Poll interval ({}s) must not exceed the refresh lead time ({}s)",
                self.poll_interval.as_secs(),
                self.refresh_lead_time.as_secs()
            )));
        }
        Ok(())
    }
}

/// Everything the session core needs to run.
#[derive(Clone)]
pub struct SessionConfig {
    /// Root of the auth service; endpoint paths are joined onto it.
    pub gateway_base_url: Url,
    /// Application origin the credential store is scoped to.
    pub origin: String,
    pub key_value_store: Arc<dyn KeyValueStore>,
    pub http_client: Arc<dyn HttpClient>,
    pub clock: Arc<dyn Clock>,
    pub timings: SessionTimings,
    pub event_buffer_size: usize,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("gateway_base_url", &self.gateway_base_url.as_str())
            .field("origin", &self.origin)
            .field("key_value_store", &"KeyValueStore { ... }")
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .field("timings", &self.timings)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.origin.trim().is_empty() {
            return Err(Error::Config("Origin cannot be empty".to_string()));
        }
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }
        if self.gateway_base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Gateway URL '{}' cannot be used as a base URL",
                self.gateway_base_url
            )));
        }
        self.timings.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_store(_origin: &str) -> Result<Arc<dyn KeyValueStore>> {
    Err(Error::CapabilityMissing {
        capability: "KeyValueStore".to_string(),
        message: "A KeyValueStore is required to persist session credentials. \
                 Desktop: enable the 'desktop-shims' feature to use the OS credential store. \
                 Web: inject a localStorage-backed store for the application origin."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_store(origin: &str) -> Result<Arc<dyn KeyValueStore>> {
    use bridge_desktop::KeyringKeyValueStore;

    Ok(Arc::new(KeyringKeyValueStore::for_origin(origin)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "An HttpClient is required to reach the auth gateway. \
                 Desktop: enable the 'desktop-shims' feature to use the reqwest client. \
                 Other hosts: inject a platform-native HTTP adapter."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new().map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: format!("Failed to build the default reqwest client: {}", e),
    })?;
    Ok(Arc::new(client))
}

/// Builder for [`SessionConfig`].
#[derive(Default)]
pub struct SessionConfigBuilder {
    gateway_base_url: Option<String>,
    origin: Option<String>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    timings: SessionTimings,
    event_buffer_size: Option<usize>,
}

impl SessionConfigBuilder {
    /// Sets the auth service root (required).
    ///
    /// A trailing slash is added when missing so relative endpoint paths
    /// resolve below it.
    pub fn gateway_base_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_base_url = Some(url.into());
        self
    }

    /// Sets the application origin. Default: `"default"`.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the time source. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Default: 5 minutes.
    pub fn refresh_lead_time(mut self, lead_time: Duration) -> Self {
        self.timings.refresh_lead_time = lead_time;
        self
    }

    /// Default: 60 seconds.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.timings.poll_interval = interval;
        self
    }

    /// Default: 30 seconds.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.timings.refresh_timeout = timeout;
        self
    }

    /// Default: 100 events.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// Fails when the gateway URL is missing or unparsable, when a required
    /// capability is missing and no platform default exists, or when a
    /// setting is out of range.
    pub fn build(self) -> Result<SessionConfig> {
        let raw_url = self.gateway_base_url.ok_or_else(|| {
            Error::Config(
                "Gateway base URL is required. Use .gateway_base_url() to set it.".to_string(),
            )
        })?;
        let gateway_base_url = parse_base_url(&raw_url)?;

        let origin = self.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string());

        let key_value_store = match self.key_value_store {
            Some(store) => store,
            None => provide_default_store(&origin)?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = SessionConfig {
            gateway_base_url,
            origin,
            key_value_store,
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            timings: self.timings,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|source| Error::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Gateway base URL must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

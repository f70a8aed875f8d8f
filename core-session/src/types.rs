//! Session value types

use crate::claims::Claims;
use crate::namespace::Namespace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access and refresh token as issued by the auth service.
///
/// The `Debug` output never contains the token values.
///
/// ```
/// use core_session::TokenPair;
///
/// let pair = TokenPair::new("access", "refresh");
/// assert!(pair.is_complete());
/// assert!(!format!("{:?}", pair).contains("\"refresh\""));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Both halves present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// A token pair materialized under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub namespace: Namespace,
    pub tokens: TokenPair,
}

impl Session {
    pub fn new(namespace: Namespace, tokens: TokenPair) -> Self {
        Self { namespace, tokens }
    }

    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.tokens.refresh_token
    }
}

/// Result of a successful refresh exchange.
///
/// Services that rotate refresh tokens return a new one; otherwise the
/// stored refresh token stays valid.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl RefreshedTokens {
    /// Combine with the refresh token that was used for the exchange.
    pub fn into_pair(self, previous_refresh: &str) -> TokenPair {
        let refresh_token = self
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| previous_refresh.to_string());
        TokenPair::new(self.access_token, refresh_token)
    }
}

impl fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("access_token", &"[REDACTED]")
            .field("rotated_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub tokens: TokenPair,
    /// Claims decoded from the issued access token.
    pub claims: Claims,
}

/// Why a refresh was requested.
///
/// Background origins sign the user out when the refresh fails; a manual
/// refresh reports the failure and leaves the session in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshOrigin {
    /// The periodic expiry monitor.
    Monitor,
    /// A request path that needed a valid token.
    Middleware,
    /// An explicit "refresh now" from the user.
    Manual,
}

impl RefreshOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshOrigin::Monitor => "monitor",
            RefreshOrigin::Middleware => "middleware",
            RefreshOrigin::Manual => "manual",
        }
    }

    /// Whether a fatal refresh failure ends the session.
    pub fn expires_session_on_failure(self) -> bool {
        !matches!(self, RefreshOrigin::Manual)
    }
}

impl fmt::Display for RefreshOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the store currently holds for a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    /// Exactly one of the two keys has a value.
    Partial,
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_pair_completeness() {
        assert!(TokenPair::new("a", "r").is_complete());
        assert!(!TokenPair::new("", "r").is_complete());
        assert!(!TokenPair::new("a", "").is_complete());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let pair = TokenPair::new("secret-access", "secret-refresh");
        let debug = format!("{:?}", pair);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));

        let refreshed = RefreshedTokens {
            access_token: "secret-access".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
        };
        let debug = format!("{:?}", refreshed);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("rotated_refresh_token: true"));
    }

    #[test]
    fn test_refreshed_tokens_keep_previous_refresh() {
        let kept = RefreshedTokens {
            access_token: "a2".to_string(),
            refresh_token: None,
        }
        .into_pair("r1");
        assert_eq!(kept, TokenPair::new("a2", "r1"));

        let blank = RefreshedTokens {
            access_token: "a2".to_string(),
            refresh_token: Some(String::new()),
        }
        .into_pair("r1");
        assert_eq!(blank, TokenPair::new("a2", "r1"));

        let rotated = RefreshedTokens {
            access_token: "a2".to_string(),
            refresh_token: Some("r2".to_string()),
        }
        .into_pair("r1");
        assert_eq!(rotated, TokenPair::new("a2", "r2"));
    }

    #[test]
    fn test_origin_policy() {
        assert!(RefreshOrigin::Monitor.expires_session_on_failure());
        assert!(RefreshOrigin::Middleware.expires_session_on_failure());
        assert!(!RefreshOrigin::Manual.expires_session_on_failure());
        assert_eq!(RefreshOrigin::Middleware.to_string(), "middleware");
    }

    #[test]
    fn test_token_pair_serde_is_camel_case() {
        let json = serde_json::to_string(&TokenPair::new("a", "r")).unwrap();
        assert_eq!(json, r#"{"accessToken":"a","refreshToken":"r"}"#);
    }
}

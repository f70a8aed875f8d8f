//! Access token claims
//!
//! Tokens are decoded, never verified: the signature is the auth service's
//! business. The client only reads the payload to learn when the token
//! expires and which roles it carries.

use crate::error::{AuthError, Result};
use crate::namespace::Namespace;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Claims read from a JWT payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: Option<String>,
    /// Roles from the `roles` claim, followed by a singular `role` claim.
    pub roles: Vec<String>,
    /// `exp`, in Unix epoch seconds.
    pub expires_at: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoleClaim {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    roles: Option<RoleClaim>,
    role: Option<String>,
    exp: Option<serde_json::Number>,
}

impl Claims {
    /// Decode the payload segment of a compact JWT.
    ///
    /// Fails with [`AuthError::DecodeFailure`] when the token is not three
    /// dot-separated segments, the payload is not base64url JSON, or `exp`
    /// is missing.
    pub fn decode(token: &str) -> Result<Claims> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
            _ => {
                return Err(AuthError::DecodeFailure(
                    "token is not a three-segment JWT".to_string(),
                ))
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::DecodeFailure(format!("payload is not base64url: {}", e)))?;

        let raw: RawClaims = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::DecodeFailure(format!("payload is not valid JSON: {}", e)))?;

        let expires_at = raw
            .exp
            .as_ref()
            .and_then(|exp| exp.as_i64().or_else(|| exp.as_f64().map(|f| f.floor() as i64)))
            .ok_or_else(|| AuthError::DecodeFailure("missing or invalid exp claim".to_string()))?;

        let mut roles = match raw.roles {
            Some(RoleClaim::Many(roles)) => roles,
            Some(RoleClaim::One(role)) => vec![role],
            None => Vec::new(),
        };
        if let Some(role) = raw.role {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        Ok(Claims {
            subject: raw.sub,
            roles,
            expires_at,
        })
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// Namespace these roles sign in to.
    pub fn namespace(&self) -> Namespace {
        Namespace::for_roles(&self.roles)
    }
}

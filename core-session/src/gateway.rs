//! Auth gateway
//!
//! The remote authentication service, seen from the client: exchange
//! credentials for a token pair, exchange a refresh token for a new access
//! token, and end the server-side session.
//!
//! [`HttpAuthGateway`] speaks the portal's JSON API over any
//! [`HttpClient`]. Tests and alternative backends implement [`AuthGateway`]
//! directly.

use crate::claims::Claims;
use crate::error::{AuthError, Result};
use crate::types::{LoginResponse, RefreshedTokens, TokenPair};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::SessionConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Remote authentication service.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchange user credentials for a token pair.
    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse>;

    /// Exchange a refresh token for a new access token.
    ///
    /// Rejections (invalid, expired or revoked refresh token) are reported
    /// as [`AuthError::AuthRejected`]; everything that prevents an answer is
    /// [`AuthError::NetworkFailure`].
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens>;

    /// End the server-side session for `tokens`.
    async fn logout(&self, tokens: &TokenPair) -> Result<()>;
}

/// Endpoint paths, relative to the gateway base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoints {
    pub login: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for GatewayEndpoints {
    fn default() -> Self {
        Self {
            login: "auth/login".to_string(),
            refresh: "auth/refresh".to_string(),
            logout: "auth/logout".to_string(),
        }
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    #[serde(alias = "access_token")]
    access_token: String,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// [`AuthGateway`] over the portal's JSON HTTP API.
pub struct HttpAuthGateway {
    http: Arc<dyn HttpClient>,
    base_url: Url,
    endpoints: GatewayEndpoints,
    request_timeout: Option<Duration>,
}

impl HttpAuthGateway {
    /// `base_url` should end with `/` so endpoint paths resolve below it.
    pub fn new(http: Arc<dyn HttpClient>, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            endpoints: GatewayEndpoints::default(),
            request_timeout: None,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.http_client.clone(), config.gateway_base_url.clone())
            .with_request_timeout(config.timings.refresh_timeout)
    }

    pub fn with_endpoints(mut self, endpoints: GatewayEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        self.base_url
            .join(path)
            .map(String::from)
            .map_err(|e| AuthError::Configuration(format!("Invalid endpoint '{}': {}", path, e)))
    }

    fn request(&self, path: &str) -> Result<HttpRequest> {
        let mut request = HttpRequest::post(self.endpoint(path)?);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        Ok(request)
    }

    /// Credential exchanges are never retried: a rotated refresh token must
    /// not be presented twice.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .http
            .execute_with_retry(request, RetryPolicy::none())
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        if response.is_success() {
            return Ok(response);
        }

        if rejects_credentials(response.status) {
            let reason = rejection_reason(&response);
            warn!(status = response.status, reason = %reason, "Auth gateway rejected request");
            return Err(AuthError::AuthRejected {
                status: Some(response.status),
                reason,
            });
        }

        warn!(status = response.status, "Auth gateway returned an error status");
        Err(AuthError::NetworkFailure(format!(
            "auth gateway returned HTTP {}",
            response.status
        )))
    }
}

/// Statuses with which the gateway refuses the presented credentials.
/// Other 4xx answers (rate limiting, request timeout, a missing route) say
/// nothing about the session and are treated like transport failures.
fn rejects_credentials(status: u16) -> bool {
    matches!(status, 400 | 401 | 403)
}

fn rejection_reason(response: &HttpResponse) -> String {
    let parsed = response
        .json::<ErrorBody>()
        .ok()
        .and_then(|body| body.message.or(body.error));
    match parsed {
        Some(reason) if !reason.is_empty() => reason,
        _ => format!("HTTP {}", response.status),
    }
}

fn parse_tokens(response: &HttpResponse) -> Result<TokenBody> {
    let body: TokenBody = response
        .json()
        .map_err(|e| AuthError::NetworkFailure(format!("unreadable token response: {}", e)))?;
    if body.access_token.is_empty() {
        return Err(AuthError::NetworkFailure(
            "token response carried an empty access token".to_string(),
        ));
    }
    Ok(body)
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    #[instrument(skip(self, identifier, secret), fields(identifier = %core_runtime::logging::redact_if_sensitive("identifier", identifier)))]
    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse> {
        let request = self
            .request(&self.endpoints.login)?
            .json(&LoginBody {
                identifier,
                password: secret,
            })
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        let response = self.send(request).await?;
        let body = parse_tokens(&response)?;
        let refresh_token = body
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::NetworkFailure("login response carried no refresh token".to_string())
            })?;

        let claims = Claims::decode(&body.access_token)?;
        debug!(roles = ?claims.roles, "Login accepted");

        Ok(LoginResponse {
            tokens: TokenPair::new(body.access_token, refresh_token),
            claims,
        })
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        let request = self
            .request(&self.endpoints.refresh)?
            .json(&RefreshBody { refresh_token })
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        let response = self.send(request).await?;
        let body = parse_tokens(&response)?;
        debug!(rotated = body.refresh_token.is_some(), "Refresh accepted");

        Ok(RefreshedTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
        })
    }

    #[instrument(skip_all)]
    async fn logout(&self, tokens: &TokenPair) -> Result<()> {
        let request = self
            .request(&self.endpoints.logout)?
            .bearer_token(&tokens.access_token)
            .json(&RefreshBody {
                refresh_token: &tokens.refresh_token,
            })
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        self.send(request).await?;
        Ok(())
    }
}

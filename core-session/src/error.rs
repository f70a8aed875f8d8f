use crate::namespace::Namespace;
use thiserror::Error;

/// Failures surfaced by the session core.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The auth service could not be reached or answered unintelligibly.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The auth service refused the credentials (400, 401 or 403).
    #[error("Authentication rejected{}: {reason}", status_suffix(.status))]
    AuthRejected { status: Option<u16>, reason: String },

    /// An access token could not be decoded into claims.
    #[error("Token decode failed: {0}")]
    DecodeFailure(String),

    /// Only one half of a token pair is stored.
    #[error("Stored session for namespace {namespace} is incomplete")]
    StorageIncomplete { namespace: Namespace },

    #[error("Credential storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("{operation} timed out")]
    OperationTimeout { operation: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    /// The refresh task ended without reporting an outcome.
    #[error("Token refresh was interrupted")]
    RefreshInterrupted,

    #[error("Invalid session configuration: {0}")]
    Configuration(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl AuthError {
    /// Errors after which the stored session can no longer be trusted and the
    /// user has to sign in again.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            AuthError::NetworkFailure(_)
                | AuthError::AuthRejected { .. }
                | AuthError::OperationTimeout { .. }
        )
    }
}

impl From<core_runtime::Error> for AuthError {
    fn from(err: core_runtime::Error) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AuthError::NetworkFailure("dns".to_string()).is_session_fatal());
        assert!(AuthError::AuthRejected {
            status: Some(401),
            reason: "expired".to_string()
        }
        .is_session_fatal());
        assert!(AuthError::OperationTimeout {
            operation: "Token refresh".to_string()
        }
        .is_session_fatal());

        assert!(!AuthError::DecodeFailure("bad".to_string()).is_session_fatal());
        assert!(!AuthError::StorageIncomplete {
            namespace: Namespace::Lab
        }
        .is_session_fatal());
        assert!(!AuthError::NotAuthenticated.is_session_fatal());
    }

    #[test]
    fn test_rejection_message_includes_status() {
        let err = AuthError::AuthRejected {
            status: Some(401),
            reason: "invalid refresh token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Authentication rejected (401): invalid refresh token"
        );

        let err = AuthError::AuthRejected {
            status: None,
            reason: "revoked".to_string(),
        };
        assert_eq!(err.to_string(), "Authentication rejected: revoked");
    }
}

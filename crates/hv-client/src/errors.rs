//! HealthVault client error types.
//!
//! Three classes matter to callers:
//!
//! - Terminal authorization failures (`Unauthorized`, `SessionExpired`):
//!   the credential was rejected and will not be renewed again for this
//!   call. `SessionExpired` additionally means the session was torn down.
//! - Caller-visible service errors (`Api`): passed through with status and
//!   the service's `error` message for the view layer to display.
//! - Local failures (`InvalidInput`, `Http`, `InvalidResponse`, `Storage`,
//!   `Configuration`, `Internal`).
//!
//! Expired access tokens never reach callers as errors unless renewal fails.

use thiserror::Error;

/// HTTP status the service uses for a rejected credential.
pub const AUTHORIZATION_FAILURE_STATUS: u16 = 401;

/// HealthVault client error type.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The credential was rejected and the request will not be retried.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Renewal failed; the session has been cleared.
    #[error("Session expired, please sign in again")]
    SessionExpired,

    /// Service answered with a non-success status other than 401.
    #[error("Request failed with status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The service's `error` message, or the raw body.
        message: String,
    },

    /// Request rejected before it was sent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body could not be parsed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Session storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Client could not be built from its configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal failure (actor stopped, channel closed).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether this error is a terminal authorization failure.
    #[must_use]
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_) | ClientError::SessionExpired)
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Unauthorized(_) | ClientError::SessionExpired => {
                Some(AUTHORIZATION_FAILURE_STATUS)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

impl From<crate::storage::StorageError> for ClientError {
    fn from(err: crate::storage::StorageError) -> Self {
        ClientError::Storage(err.to_string())
    }
}

/// Whether an HTTP status is the "credential rejected" class.
///
/// Only 401 qualifies. 403 and every other 4xx/5xx are caller-visible.
#[must_use]
pub fn is_authorization_failure_status(status: u16) -> bool {
    status == AUTHORIZATION_FAILURE_STATUS
}

/// Extract the service's error message from a JSON body of the form
/// `{"error": "..."}`, falling back to the trimmed raw body.
#[must_use]
pub fn service_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_failure_classification() {
        assert!(ClientError::Unauthorized("x".into()).is_authorization_failure());
        assert!(ClientError::SessionExpired.is_authorization_failure());
        assert!(!ClientError::Api {
            status: 403,
            message: "forbidden".into()
        }
        .is_authorization_failure());
        assert!(!ClientError::Http("timeout".into()).is_authorization_failure());
    }

    #[test]
    fn test_only_401_is_authorization_failure_status() {
        assert!(is_authorization_failure_status(401));
        for status in [400, 403, 404, 409, 422, 500, 502] {
            assert!(!is_authorization_failure_status(status));
        }
    }

    #[test]
    fn test_status_mapping() {
        let err = ClientError::Api {
            status: 404,
            message: "record not found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(ClientError::SessionExpired.status(), Some(401));
        assert_eq!(ClientError::Storage("disk".into()).status(), None);
    }

    #[test]
    fn test_service_error_message_prefers_error_field() {
        assert_eq!(
            service_error_message(r#"{"error":"Invalid credentials"}"#),
            "Invalid credentials"
        );
        assert_eq!(service_error_message("  upstream down \n"), "upstream down");
        assert_eq!(
            service_error_message(r#"{"message":"ok"}"#),
            r#"{"message":"ok"}"#
        );
    }

    #[test]
    fn test_display() {
        let err = ClientError::Api {
            status: 500,
            message: "Failed to create record".into(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("Failed to create record"));
        assert!(ClientError::SessionExpired.to_string().contains("sign in"));
    }
}

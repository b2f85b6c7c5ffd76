//! Authentication endpoints of the health-record service.
//!
//! - `POST /login` `{email, password}` -> `{access_token, refresh_token}`
//! - `POST /refresh` `{refresh_token}` -> `{access_token, refresh_token?}`
//! - `POST /logout` `{refresh_token}` (best-effort)
//!
//! Renewal sits behind the [`TokenRenewer`] trait so the refresh coordinator
//! can be driven by a mock in tests.
//!
//! # Security
//!
//! - Passwords and tokens travel as `SecretString` and are exposed only
//!   when the request body is built
//! - Error bodies from the renewal endpoint are logged at trace level only
//! - Response types holding tokens implement `Debug` with `[REDACTED]`

use crate::authorizer::{authorize, ApiRequest, ApiResponse};
use crate::errors::{is_authorization_failure_status, service_error_message, ClientError};
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, trace, warn};

/// Message shown for a failed login when the service gave no reason.
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please try again.";

pub const LOGIN_PATH: &str = "/login";
pub const REFRESH_PATH: &str = "/refresh";
pub const LOGOUT_PATH: &str = "/logout";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: SecretString,
    #[serde(default)]
    refresh_token: Option<SecretString>,
}

/// Token pair issued by a successful login.
pub struct LoginTokens {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
}

impl fmt::Debug for LoginTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Result of a successful renewal. `refresh_token` is set only when the
/// service rotated it.
pub struct RenewedTokens {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
}

impl fmt::Debug for RenewedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewedTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn non_empty(tokens: TokenResponse) -> Result<TokenResponse, ClientError> {
    if tokens.access_token.expose_secret().is_empty() {
        return Err(ClientError::InvalidResponse(
            "empty access token in response".to_string(),
        ));
    }
    Ok(tokens)
}

// =============================================================================
// TokenRenewer
// =============================================================================

/// Exchanges a refresh token for a new access token.
#[async_trait::async_trait]
pub trait TokenRenewer: Send + Sync {
    /// Perform one renewal call.
    ///
    /// # Errors
    ///
    /// Any error is treated as terminal by the refresh coordinator.
    async fn renew(&self, refresh_token: &SecretString) -> Result<RenewedTokens, ClientError>;
}

// =============================================================================
// AuthApi
// =============================================================================

/// HTTP client for the authentication endpoints.
#[derive(Debug, Clone)]
pub struct AuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl AuthApi {
    /// Create a client for `base_url` (e.g. `http://localhost:8080/api/v1`).
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn post(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let response = request
            .to_request_builder(&self.http, &self.base_url)
            .send()
            .await
            .map_err(|e| {
                debug!(target: "hv.auth_api", error = %e, path = %request.path(), "HTTP request failed");
                ClientError::Http(e.to_string())
            })?;
        ApiResponse::read(response).await
    }

    /// Exchange credentials for a token pair.
    ///
    /// # Errors
    ///
    /// - `ClientError::Unauthorized` - credentials rejected; carries the
    ///   service's message (or [`LOGIN_FAILED_MESSAGE`])
    /// - `ClientError::Api` - any other non-success status
    /// - `ClientError::Http` / `ClientError::InvalidResponse` - transport or
    ///   parse failure
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginTokens, ClientError> {
        let request = ApiRequest::post(LOGIN_PATH).with_json(&LoginBody {
            email,
            password: password.expose_secret(),
        })?;
        let response = self.post(request).await?;

        if !response.is_success() {
            let message = login_failure_message(response.body());
            warn!(target: "hv.auth_api", status = response.status(), "Login rejected");
            return Err(if is_authorization_failure_status(response.status()) {
                ClientError::Unauthorized(message)
            } else {
                ClientError::Api {
                    status: response.status(),
                    message,
                }
            });
        }

        let tokens = non_empty(response.json::<TokenResponse>()?)?;
        debug!(target: "hv.auth_api", "Login succeeded");
        Ok(LoginTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Revoke the refresh token. Callers treat failure as non-fatal.
    ///
    /// # Errors
    ///
    /// Returns the transport or status error so the caller can log it.
    #[instrument(skip_all)]
    pub async fn logout(
        &self,
        refresh_token: &SecretString,
        access_token: Option<&SecretString>,
    ) -> Result<(), ClientError> {
        let request = ApiRequest::post(LOGOUT_PATH).with_json(&RefreshBody {
            refresh_token: refresh_token.expose_secret(),
        })?;
        let response = self.post(authorize(request, access_token)).await?;

        if response.is_success() {
            debug!(target: "hv.auth_api", "Refresh token revoked");
            Ok(())
        } else {
            Err(ClientError::Api {
                status: response.status(),
                message: service_error_message(response.body()),
            })
        }
    }
}

fn login_failure_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string())
}

#[async_trait::async_trait]
impl TokenRenewer for AuthApi {
    #[instrument(skip_all)]
    async fn renew(&self, refresh_token: &SecretString) -> Result<RenewedTokens, ClientError> {
        let request = ApiRequest::post(REFRESH_PATH).with_json(&RefreshBody {
            refresh_token: refresh_token.expose_secret(),
        })?;
        let response = self.post(request).await?;

        if !response.is_success() {
            warn!(target: "hv.auth_api", status = response.status(), "Renewal rejected");
            trace!(target: "hv.auth_api", body = %response.body(), "Renewal rejection body");
            return Err(if is_authorization_failure_status(response.status()) {
                ClientError::Unauthorized("refresh token rejected".to_string())
            } else {
                ClientError::Api {
                    status: response.status(),
                    message: service_error_message(response.body()),
                }
            });
        }

        let tokens = non_empty(response.json::<TokenResponse>()?)?;
        debug!(
            target: "hv.auth_api",
            rotated = tokens.refresh_token.is_some(),
            "Access token renewed"
        );
        Ok(RenewedTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }
}

/// Mock token renewer module for testing.
///
/// Counts calls, records the refresh token it was given, and can be held
/// open until a test releases it.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Mock renewer.
    pub struct MockRenewer {
        /// Access tokens to issue, cycled.
        access_tokens: Vec<String>,
        /// Rotated refresh token to return, if any.
        rotated_refresh: Option<String>,
        /// Whether to fail every call.
        return_error: bool,
        /// Blocks each call until a permit is released.
        gate: Option<Semaphore>,
        call_count: AtomicUsize,
        last_refresh_token: Mutex<Option<String>>,
    }

    impl MockRenewer {
        fn with(access_tokens: Vec<String>, return_error: bool, gated: bool) -> Self {
            Self {
                access_tokens,
                rotated_refresh: None,
                return_error,
                gate: gated.then(|| Semaphore::new(0)),
                call_count: AtomicUsize::new(0),
                last_refresh_token: Mutex::new(None),
            }
        }

        /// Always issue `access_token`.
        pub fn issuing(access_token: &str) -> Self {
            Self::with(vec![access_token.to_string()], false, false)
        }

        /// Issue the given tokens in sequence, cycling.
        pub fn with_tokens(tokens: &[&str]) -> Self {
            Self::with(tokens.iter().map(ToString::to_string).collect(), false, false)
        }

        /// Issue `access_token`, but only once [`MockRenewer::release`] is called.
        pub fn held(access_token: &str) -> Self {
            Self::with(vec![access_token.to_string()], false, true)
        }

        /// Fail every call, as a rejected refresh token would.
        pub fn failing() -> Self {
            Self::with(Vec::new(), true, false)
        }

        /// Fail every call once released.
        pub fn held_failing() -> Self {
            Self::with(Vec::new(), true, true)
        }

        /// Also return a rotated refresh token.
        #[must_use]
        pub fn rotating(mut self, refresh_token: &str) -> Self {
            self.rotated_refresh = Some(refresh_token.to_string());
            self
        }

        /// Let `n` held calls complete.
        pub fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Refresh token presented on the latest call.
        pub fn last_refresh_token(&self) -> Option<String> {
            self.last_refresh_token
                .lock()
                .ok()
                .and_then(|guard| guard.clone())
        }

        /// Wait until at least `n` calls have started, up to one second.
        pub async fn wait_for_calls(&self, n: usize) -> bool {
            for _ in 0..200 {
                if self.call_count() >= n {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.call_count() >= n
        }
    }

    #[async_trait::async_trait]
    impl TokenRenewer for MockRenewer {
        async fn renew(&self, refresh_token: &SecretString) -> Result<RenewedTokens, ClientError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = self.last_refresh_token.lock() {
                *last = Some(refresh_token.expose_secret().to_string());
            }

            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|_| ClientError::Internal("mock gate closed".to_string()))?;
                permit.forget();
            }

            if self.return_error || self.access_tokens.is_empty() {
                return Err(ClientError::Unauthorized(
                    "refresh token rejected".to_string(),
                ));
            }

            let token = self
                .access_tokens
                .get(count % self.access_tokens.len())
                .cloned()
                .unwrap_or_default();

            Ok(RenewedTokens {
                access_token: SecretString::from(token),
                refresh_token: self.rotated_refresh.clone().map(SecretString::from),
            })
        }
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> AuthApi {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        AuthApi::new(http, format!("{}/api/v1", server.uri()))
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login"))
            .and(body_json(serde_json::json!({
                "email": "doc@example.com",
                "password": "pw"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a.b.c",
                "refresh_token": "r-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = api_for(&server)
            .login("doc@example.com", &SecretString::from("pw"))
            .await
            .unwrap();

        assert_eq!(tokens.access_token.expose_secret(), "a.b.c");
        assert_eq!(tokens.refresh_token.unwrap().expose_secret(), "r-1");
    }

    #[tokio::test]
    async fn test_login_rejected_surfaces_service_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let err = api_for(&server)
            .login("doc@example.com", &SecretString::from("wrong"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Unauthorized(ref m) if m == "Invalid credentials"));
    }

    #[tokio::test]
    async fn test_login_failure_without_message_uses_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/login"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = api_for(&server)
            .login("doc@example.com", &SecretString::from("pw"))
            .await
            .unwrap_err();

        assert!(
            matches!(err, ClientError::Api { status: 500, ref message } if message == LOGIN_FAILED_MESSAGE),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_renew_success_and_rotation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/refresh"))
            .and(body_json(serde_json::json!({"refresh_token": "r-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "T2",
                "refresh_token": "r-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = api_for(&server)
            .renew(&SecretString::from("r-1"))
            .await
            .unwrap();

        assert_eq!(tokens.access_token.expose_secret(), "T2");
        assert_eq!(tokens.refresh_token.unwrap().expose_secret(), "r-2");
    }

    #[tokio::test]
    async fn test_renew_without_rotation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "T2"})),
            )
            .mount(&server)
            .await;

        let tokens = api_for(&server)
            .renew(&SecretString::from("r-1"))
            .await
            .unwrap();
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_renew_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/refresh"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "refresh token expired"})),
            )
            .mount(&server)
            .await;

        let result = api_for(&server).renew(&SecretString::from("r-1")).await;
        assert!(matches!(result, Err(ClientError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_renew_empty_token_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": ""})),
            )
            .mount(&server)
            .await;

        let result = api_for(&server).renew(&SecretString::from("r-1")).await;
        assert!(matches!(result, Err(ClientError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_logout_sends_refresh_token_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/logout"))
            .and(header("Authorization", "Bearer a-1"))
            .and(body_json(serde_json::json!({"refresh_token": "r-1"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        api_for(&server)
            .logout(&SecretString::from("r-1"), Some(&SecretString::from("a-1")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transport_failure_is_http_error() {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        // Port 9 (discard) on localhost is not expected to accept connections.
        let api = AuthApi::new(http, "http://127.0.0.1:9/api/v1");

        let result = api.renew(&SecretString::from("r")).await;
        assert!(matches!(result, Err(ClientError::Http(_))));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let tokens = RenewedTokens {
            access_token: SecretString::from("T2"),
            refresh_token: Some(SecretString::from("r-2")),
        };
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("T2"));
        assert!(!debug.contains("r-2"));
    }
}

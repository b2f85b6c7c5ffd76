//! Mock health-record service
//!
//! Wraps a wiremock `MockServer` with mounts for the authentication
//! endpoints and for protected resources that accept exactly one bearer
//! token. Expectations set with `expect` are verified when the server drops.

use hv_client::config::Config;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// API prefix the service mounts its routes under.
pub const API_PREFIX: &str = "/api/v1";

/// Test harness for the health-record service.
///
/// # Example
/// ```rust,ignore
/// let api = MockHealthApi::start().await;
/// api.mount_protected("/patient/records", "T2").await;
/// api.mount_refresh(TEST_REFRESH_TOKEN_1, "T2", Duration::ZERO, 1).await;
/// ```
pub struct MockHealthApi {
    server: MockServer,
}

impl MockHealthApi {
    /// Start a mock service on a random local port.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL including the API prefix.
    pub fn base_url(&self) -> String {
        format!("{}{API_PREFIX}", self.server.uri())
    }

    /// Client configuration pointing at this service.
    pub fn config(&self) -> Config {
        Config {
            api_base_url: self.base_url(),
            ..Config::default()
        }
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// `POST /login` issues `access_token` and `refresh_token`.
    pub async fn mount_login(&self, access_token: &str, refresh_token: &str) {
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/login")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "refresh_token": refresh_token,
            })))
            .mount(&self.server)
            .await;
    }

    /// `POST /login` rejects the credentials with `message`.
    pub async fn mount_login_rejected(&self, message: &str) {
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/login")))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": message })))
            .mount(&self.server)
            .await;
    }

    /// `POST /refresh` with `refresh_token` issues `access_token` after
    /// `delay`, and must be called exactly `expected_calls` times.
    pub async fn mount_refresh(
        &self,
        refresh_token: &str,
        access_token: &str,
        delay: Duration,
        expected_calls: u64,
    ) {
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/refresh")))
            .and(body_json(json!({ "refresh_token": refresh_token })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": access_token }))
                    .set_delay(delay),
            )
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// `POST /refresh` fails with `status`.
    pub async fn mount_refresh_failure(&self, status: u16, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/refresh")))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({ "error": "Invalid refresh token" })),
            )
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// `GET resource` answers 200 for `Bearer accepted_token` and 401 for
    /// anything else.
    pub async fn mount_protected(&self, resource: &str, accepted_token: &str) {
        let full_path = format!("{API_PREFIX}{resource}");
        Mock::given(method("GET"))
            .and(path(full_path.clone()))
            .and(header("Authorization", format!("Bearer {accepted_token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .with_priority(1)
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(full_path))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid token" })),
            )
            .mount(&self.server)
            .await;
    }

    /// `GET resource` answers `status` with a service error body.
    pub async fn mount_error(&self, resource: &str, status: u16, message: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{API_PREFIX}{resource}")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "error": message })))
            .mount(&self.server)
            .await;
    }

    /// `POST /logout` succeeds.
    pub async fn mount_logout(&self) {
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/logout")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "message": "Logged out" })),
            )
            .mount(&self.server)
            .await;
    }

    /// Requests received for `resource` (path below the API prefix).
    pub async fn requests_to(&self, resource: &str) -> Vec<Request> {
        let full_path = format!("{API_PREFIX}{resource}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == full_path)
            .collect()
    }

    /// Number of requests received for `resource`.
    pub async fn count_requests(&self, resource: &str) -> usize {
        self.requests_to(resource).await.len()
    }

    /// `Authorization` header of every request received for `resource`, in
    /// arrival order.
    pub async fn bearer_headers(&self, resource: &str) -> Vec<Option<String>> {
        self.requests_to(resource)
            .await
            .iter()
            .map(|request| {
                request
                    .headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }
}

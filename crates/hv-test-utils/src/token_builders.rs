//! Builder for test access tokens
//!
//! The client reads claims without verifying signatures, so tokens built
//! here carry a fixed placeholder signature.

use crate::test_ids::{TEST_DOCTOR_ID, TEST_PATIENT_ID};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use common::types::{Role, UserId};
use serde_json::json;

/// Builder for unsigned access tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user(TEST_DOCTOR_ID)
///     .with_role(Role::Doctor)
///     .expires_in(900)
///     .build();
/// ```
pub struct TestTokenBuilder {
    user_id: UserId,
    role: String,
    exp: i64,
    nonce: Option<String>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (patient, expires in 15 minutes)
    pub fn new() -> Self {
        Self {
            user_id: TEST_PATIENT_ID,
            role: Role::Patient.as_str().to_string(),
            exp: (Utc::now() + Duration::seconds(900)).timestamp(),
            nonce: None,
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role.as_str().to_string();
        self
    }

    /// Set a role string the client does not know
    pub fn with_raw_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    /// Set expiration in seconds from now
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Distinguish otherwise identical tokens (e.g. before and after renewal)
    pub fn with_nonce(mut self, nonce: &str) -> Self {
        self.nonce = Some(nonce.to_string());
        self
    }

    /// Build the claims as a JSON value
    pub fn claims(&self) -> serde_json::Value {
        let mut claims = json!({
            "user_id": self.user_id.0,
            "role": self.role,
            "exp": self.exp,
        });
        if let Some(nonce) = &self.nonce {
            claims["jti"] = json!(nonce);
        }
        claims
    }

    /// Build the encoded token
    pub fn build(self) -> String {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "HS256", "typ": "JWT"}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(self.claims().to_string());
        format!("{header}.{payload}.test-signature")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Access token for the test doctor.
pub fn doctor_token() -> String {
    TestTokenBuilder::new()
        .for_user(TEST_DOCTOR_ID)
        .with_role(Role::Doctor)
        .build()
}

//! JWT utilities for the HealthVault client.
//!
//! The client never verifies access token signatures; that is the service's
//! job. It only needs to read the identity claims (`user_id`, `role`) out of
//! the payload at login time so that the principal can be shown and routed
//! without another round trip.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Decoded claims are never used for an authorization decision the server
//!   does not also make; a forged payload only changes which views the
//!   client renders, every API call is still checked server-side
//! - Error messages are generic; details are logged at debug level
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::decode_access_claims;
//!
//! let claims = decode_access_claims(access_token.expose_secret())?;
//! let principal = claims.into_principal(email);
//! ```

use crate::types::{Principal, Role, UserId};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (8KB).
///
/// Typical access tokens from the service are well under 300 bytes.
/// Anything larger is rejected before base64 decoding.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while decoding access token claims.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtDecodeError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid")]
    TokenTooLarge,

    /// Token is not a three-part compact JWT, or a part is not valid
    /// base64url/JSON.
    #[error("The access token is invalid")]
    MalformedToken,

    /// Payload lacks a required claim or the claim has the wrong type.
    #[error("The access token is missing claim: {0}")]
    MissingClaim(&'static str),

    /// The `role` claim holds a role this client does not know.
    #[error("The access token carries an unknown role")]
    UnknownRole,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Identity claims carried by a HealthVault access token.
///
/// # Fields
///
/// - `user_id`: numeric subject identifier
/// - `role`: one of `doctor`, `patient`, `admin`
/// - `exp`: expiration timestamp (Unix epoch seconds), if present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject identifier.
    pub user_id: UserId,

    /// Role granted to the subject.
    pub role: Role,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl AccessClaims {
    /// Build the session principal from these claims and the login email.
    #[must_use]
    pub fn into_principal(self, email: impl Into<String>) -> Principal {
        Principal::new(self.user_id, self.role, email)
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Decode the identity claims from an access token WITHOUT verifying its
/// signature.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - not `header.payload.signature`, bad base64url or bad JSON
/// - `MissingClaim` - `user_id` or `role` absent or of the wrong type
/// - `UnknownRole` - `role` is not a known role string
pub fn decode_access_claims(token: &str) -> Result<AccessClaims, JwtDecodeError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtDecodeError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtDecodeError::MalformedToken);
    };

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT payload base64");
        JwtDecodeError::MalformedToken
    })?;

    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
        JwtDecodeError::MalformedToken
    })?;

    let user_id = payload
        .get("user_id")
        .and_then(serde_json::Value::as_u64)
        .map(UserId)
        .ok_or(JwtDecodeError::MissingClaim("user_id"))?;

    let role = payload
        .get("role")
        .and_then(serde_json::Value::as_str)
        .ok_or(JwtDecodeError::MissingClaim("role"))?
        .parse::<Role>()
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Token carries unknown role");
            JwtDecodeError::UnknownRole
        })?;

    let exp = payload.get("exp").and_then(serde_json::Value::as_i64);

    Ok(AccessClaims { user_id, role, exp })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload);
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_decode_valid_token() {
        let token = token_with_payload(r#"{"user_id":42,"role":"doctor","exp":1700000000}"#);

        let claims = decode_access_claims(&token).unwrap();
        assert_eq!(claims.user_id, UserId(42));
        assert_eq!(claims.role, Role::Doctor);
        assert_eq!(claims.exp, Some(1_700_000_000));
    }

    #[test]
    fn test_decode_without_exp() {
        let token = token_with_payload(r#"{"user_id":1,"role":"admin"}"#);

        let claims = decode_access_claims(&token).unwrap();
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn test_into_principal_uses_login_email() {
        let token = token_with_payload(r#"{"user_id":9,"role":"patient"}"#);
        let principal = decode_access_claims(&token)
            .unwrap()
            .into_principal("pat@example.com");

        assert_eq!(principal.id, UserId(9));
        assert_eq!(principal.role, Role::Patient);
        assert_eq!(principal.email, "pat@example.com");
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert_eq!(
            decode_access_claims("not-a-jwt"),
            Err(JwtDecodeError::MalformedToken)
        );
        assert_eq!(decode_access_claims(""), Err(JwtDecodeError::MalformedToken));
        assert_eq!(
            decode_access_claims("a.b.c.d"),
            Err(JwtDecodeError::MalformedToken)
        );
    }

    #[test]
    fn test_invalid_base64_payload_rejected() {
        let result = decode_access_claims("header.!!!invalid!!!.signature");
        assert_eq!(result, Err(JwtDecodeError::MalformedToken));
    }

    #[test]
    fn test_invalid_json_payload_rejected() {
        let token = token_with_payload("not-json");
        assert_eq!(
            decode_access_claims(&token),
            Err(JwtDecodeError::MalformedToken)
        );
    }

    #[test]
    fn test_missing_claims_rejected() {
        let token = token_with_payload(r#"{"role":"doctor"}"#);
        assert_eq!(
            decode_access_claims(&token),
            Err(JwtDecodeError::MissingClaim("user_id"))
        );

        let token = token_with_payload(r#"{"user_id":3}"#);
        assert_eq!(
            decode_access_claims(&token),
            Err(JwtDecodeError::MissingClaim("role"))
        );
    }

    #[test]
    fn test_string_user_id_rejected() {
        let token = token_with_payload(r#"{"user_id":"3","role":"doctor"}"#);
        assert_eq!(
            decode_access_claims(&token),
            Err(JwtDecodeError::MissingClaim("user_id"))
        );
    }

    #[test]
    fn test_unknown_role_rejected() {
        let token = token_with_payload(r#"{"user_id":3,"role":"nurse"}"#);
        assert_eq!(
            decode_access_claims(&token),
            Err(JwtDecodeError::UnknownRole)
        );
    }

    #[test]
    fn test_oversized_token_rejected() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            decode_access_claims(&oversized),
            Err(JwtDecodeError::TokenTooLarge)
        );
    }

    #[test]
    fn test_error_messages_are_generic() {
        assert_eq!(
            JwtDecodeError::TokenTooLarge.to_string(),
            JwtDecodeError::MalformedToken.to_string()
        );
    }
}

//! Shared domain types for HealthVault client components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Numeric user identifier assigned by the health-record service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role carried in the access token's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Clinician; creates and edits medical records.
    Doctor,
    /// Record owner; reads own records.
    Patient,
    /// Administrator; reads all records and audit logs.
    Admin,
}

impl Role {
    /// All roles, in a stable order.
    pub const ALL: [Role; 3] = [Role::Doctor, Role::Patient, Role::Admin];

    /// Wire representation of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Patient => "patient",
            Role::Admin => "admin",
        }
    }

    /// Landing view for a signed-in user holding this role.
    #[must_use]
    pub fn home_route(self) -> &'static str {
        match self {
            Role::Doctor => "/doctor",
            Role::Patient => "/patient",
            Role::Admin => "/admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The authenticated identity behind a session.
///
/// Derived from the access token claims at login; the email is the one the
/// user signed in with. Serialized into the `user` storage slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject identifier (`user_id` claim).
    pub id: UserId,
    /// Role (`role` claim).
    pub role: Role,
    /// Login email.
    pub email: String,
}

impl Principal {
    /// Create a new principal.
    #[must_use]
    pub fn new(id: UserId, role: Role, email: impl Into<String>) -> Self {
        Self {
            id,
            role,
            email: email.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = "nurse".parse::<Role>().unwrap_err();
        assert_eq!(err, UnknownRole("nurse".to_string()));
        assert!(err.to_string().contains("nurse"));
    }

    #[test]
    fn test_role_serde_is_lowercase() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");

        let role: Role = serde_json::from_str("\"doctor\"").unwrap();
        assert_eq!(role, Role::Doctor);
    }

    #[test]
    fn test_home_routes() {
        assert_eq!(Role::Doctor.home_route(), "/doctor");
        assert_eq!(Role::Patient.home_route(), "/patient");
        assert_eq!(Role::Admin.home_route(), "/admin");
    }

    #[test]
    fn test_principal_serialization_shape() {
        let principal = Principal::new(UserId(7), Role::Patient, "p@example.com");
        let value = serde_json::to_value(&principal).unwrap();

        assert_eq!(value["id"], 7);
        assert_eq!(value["role"], "patient");
        assert_eq!(value["email"], "p@example.com");

        let back: Principal = serde_json::from_value(value).unwrap();
        assert_eq!(back, principal);
    }
}

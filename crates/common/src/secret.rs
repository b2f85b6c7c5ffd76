//! Secret types for keeping credentials out of logs.
//!
//! This module re-exports types from the [`secrecy`] crate. Every access
//! token, refresh token and password handled by the client is carried as a
//! [`SecretString`] so that `Debug` output and `tracing` fields never contain
//! the raw value.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct LoginForm {
//!     email: String,
//!     password: SecretString,
//! }
//!
//! let form = LoginForm {
//!     email: "dr.house@example.com".to_string(),
//!     password: SecretString::from("vicodin"),
//! };
//!
//! // Debug output redacts the password.
//! assert!(!format!("{form:?}").contains("vicodin"));
//!
//! // The raw value is only reachable through an explicit call.
//! assert_eq!(form.password.expose_secret(), "vicodin");
//! ```
//!
//! # Usage Guidelines
//!
//! Use `SecretString` for:
//! - Access tokens (bearer credentials)
//! - Refresh tokens
//! - Login and password-reset passwords
//!
//! Call `expose_secret()` only at the point a value leaves the process
//! (request header, request body, storage slot).

pub use secrecy::{ExposeSecret, SecretString};

/// Compare two secrets by value.
///
/// `SecretString` deliberately has no `PartialEq`; the refresh coordinator
/// needs to know whether the token a request was sent with is still the
/// current one.
#[must_use]
pub fn same_secret(a: &SecretString, b: &SecretString) -> bool {
    a.expose_secret() == b.expose_secret()
}

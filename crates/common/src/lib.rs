//! Common utilities and types shared across HealthVault client components.

#![warn(clippy::pedantic)]

/// Module for shared domain types (roles, user ids, principals)
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (unverified claim decoding, size limits)
pub mod jwt;

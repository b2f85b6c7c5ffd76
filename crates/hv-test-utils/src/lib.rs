//! # HealthVault Test Utilities
//!
//! Shared test utilities for the HealthVault session client.
//!
//! This crate provides:
//! - Fixed test identities (user IDs, emails, tokens)
//! - Unsigned access token builder (`TestTokenBuilder`)
//! - A wiremock-backed stand-in for the health-record service (`MockHealthApi`)
//! - Custom assertions (`SessionAssertions`, `StorageAssertions`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hv_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let api = MockHealthApi::start().await;
//!     api.mount_login(&doctor_token(), TEST_REFRESH_TOKEN_1).await;
//!
//!     let manager = SessionManager::new(&api.config(), Arc::new(MemoryStorage::new())).unwrap();
//!     manager.login(TEST_DOCTOR_EMAIL, &test_password()).await.unwrap();
//!
//!     manager.assert_signed_in_as(TEST_DOCTOR_ID, Role::Doctor);
//! }
//! ```

pub mod assertions;
pub mod mock_api;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use mock_api::*;
pub use test_ids::*;
pub use token_builders::*;

//! Fixed test identities for deterministic tests

use common::types::UserId;
use secrecy::SecretString;

// User IDs
pub const TEST_ADMIN_ID: UserId = UserId(1);
pub const TEST_DOCTOR_ID: UserId = UserId(3);
pub const TEST_PATIENT_ID: UserId = UserId(21);

// Login emails
pub const TEST_ADMIN_EMAIL: &str = "admin@healthvault.test";
pub const TEST_DOCTOR_EMAIL: &str = "doctor@healthvault.test";
pub const TEST_PATIENT_EMAIL: &str = "patient@healthvault.test";

pub const TEST_PASSWORD: &str = "test-password-do-not-use";

// Opaque refresh tokens
pub const TEST_REFRESH_TOKEN_1: &str = "refresh-token-1";
pub const TEST_REFRESH_TOKEN_2: &str = "refresh-token-2";

/// [`TEST_PASSWORD`] as a secret.
pub fn test_password() -> SecretString {
    SecretString::from(TEST_PASSWORD)
}

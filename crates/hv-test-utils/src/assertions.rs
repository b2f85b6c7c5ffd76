//! Custom test assertions for session state

use common::types::{Role, UserId};
use hv_client::credential_store::{ACCESS_TOKEN_SLOT, PRINCIPAL_SLOT, REFRESH_TOKEN_SLOT};
use hv_client::storage::{MemoryStorage, SessionStorage};
use hv_client::{SessionEvent, SessionManager};

/// Assertions on a [`SessionManager`]
///
/// # Example
/// ```rust,ignore
/// manager
///     .assert_signed_in_as(TEST_DOCTOR_ID, Role::Doctor)
///     .assert_last_event(SessionEvent::LoggedIn);
/// ```
pub trait SessionAssertions {
    /// Assert an active session for this user and role
    fn assert_signed_in_as(&self, user_id: UserId, role: Role) -> &Self;

    /// Assert that no session is active and the published state agrees
    fn assert_signed_out(&self) -> &Self;

    /// Assert the most recently published session event
    fn assert_last_event(&self, event: SessionEvent) -> &Self;
}

impl SessionAssertions for SessionManager {
    fn assert_signed_in_as(&self, user_id: UserId, role: Role) -> &Self {
        assert!(self.is_authenticated(), "Expected an active session");
        let principal = self.current_principal().expect("Active session has no principal");
        assert_eq!(principal.id, user_id, "Unexpected user id");
        assert_eq!(principal.role, role, "Unexpected role");

        let snapshot = self.snapshot();
        assert_eq!(
            snapshot.principal(),
            Some(&principal),
            "Published principal differs from stored principal"
        );
        self
    }

    fn assert_signed_out(&self) -> &Self {
        assert!(!self.is_authenticated(), "Expected no active session");
        assert!(
            self.current_principal().is_none(),
            "Signed-out session still has a principal"
        );
        assert!(
            !self.snapshot().is_authenticated(),
            "Published state still authenticated"
        );
        self
    }

    fn assert_last_event(&self, event: SessionEvent) -> &Self {
        assert_eq!(self.snapshot().event(), event, "Unexpected last session event");
        self
    }
}

/// Assertions on session storage contents
pub trait StorageAssertions {
    /// Assert that all three session slots are populated
    fn assert_holds_session(&self) -> &Self;

    /// Assert that no session slot remains
    fn assert_no_session(&self) -> &Self;

    /// Assert the value of one slot
    fn assert_slot(&self, slot: &str, expected: &str) -> &Self;
}

impl StorageAssertions for MemoryStorage {
    fn assert_holds_session(&self) -> &Self {
        let slots = self.read().expect("Memory storage read failed");
        for slot in [ACCESS_TOKEN_SLOT, REFRESH_TOKEN_SLOT, PRINCIPAL_SLOT] {
            assert!(slots.contains_key(slot), "Missing storage slot '{slot}'");
        }
        self
    }

    fn assert_no_session(&self) -> &Self {
        let slots = self.read().expect("Memory storage read failed");
        for slot in [ACCESS_TOKEN_SLOT, REFRESH_TOKEN_SLOT, PRINCIPAL_SLOT] {
            assert!(!slots.contains_key(slot), "Storage slot '{slot}' still present");
        }
        self
    }

    fn assert_slot(&self, slot: &str, expected: &str) -> &Self {
        let slots = self.read().expect("Memory storage read failed");
        assert_eq!(
            slots.get(slot).map(String::as_str),
            Some(expected),
            "Unexpected value in storage slot '{slot}'"
        );
        self
    }
}

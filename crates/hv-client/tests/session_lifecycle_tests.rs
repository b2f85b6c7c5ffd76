//! Session lifecycle integration tests.
//!
//! Drives `SessionManager` against a mocked health-record service: sign-in,
//! silent renewal under concurrent expiry, forced logout, and restore.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use futures::future::join_all;
use common::types::{Principal, Role};
use hv_client::credential_store::{ACCESS_TOKEN_SLOT, PRINCIPAL_SLOT, REFRESH_TOKEN_SLOT};
use hv_client::endpoints;
use hv_client::storage::MemoryStorage;
use hv_client::{ApiRequest, ClientError, RouteDecision, SessionEvent, SessionManager};
use hv_test_utils::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const RECORDS: &str = "/patient/records";

/// Storage holding a patient session signed in with `access_token`.
fn stored_patient_session(access_token: &str, refresh_token: Option<&str>) -> MemoryStorage {
    let principal = Principal::new(TEST_PATIENT_ID, Role::Patient, TEST_PATIENT_EMAIL);
    let mut slots = vec![
        (ACCESS_TOKEN_SLOT, access_token.to_string()),
        (PRINCIPAL_SLOT, serde_json::to_string(&principal).unwrap()),
    ];
    if let Some(refresh_token) = refresh_token {
        slots.push((REFRESH_TOKEN_SLOT, refresh_token.to_string()));
    }
    MemoryStorage::with_slots(slots)
}

#[tokio::test]
async fn test_login_then_access_protected_resource() -> Result<()> {
    let api = MockHealthApi::start().await;
    let token = doctor_token();
    api.mount_login(&token, TEST_REFRESH_TOKEN_1).await;
    api.mount_protected("/doctor/dashboard", &token).await;

    let storage = MemoryStorage::new();
    let manager = SessionManager::new(&api.config(), Arc::new(storage.clone()))?;
    manager.assert_signed_out().assert_last_event(SessionEvent::Restored);

    let principal = manager.login(TEST_DOCTOR_EMAIL, &test_password()).await?;
    assert_eq!(principal.email, TEST_DOCTOR_EMAIL);

    manager
        .assert_signed_in_as(TEST_DOCTOR_ID, Role::Doctor)
        .assert_last_event(SessionEvent::LoggedIn);
    storage
        .assert_holds_session()
        .assert_slot(ACCESS_TOKEN_SLOT, &token)
        .assert_slot(REFRESH_TOKEN_SLOT, TEST_REFRESH_TOKEN_1);

    let response = manager.send(endpoints::doctor_dashboard()).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(
        api.bearer_headers("/doctor/dashboard").await,
        vec![Some(format!("Bearer {token}"))]
    );
    assert_eq!(manager.evaluate_route("/doctor"), RouteDecision::Allow);
    Ok(())
}

#[tokio::test]
async fn test_rejected_login_surfaces_service_message() -> Result<()> {
    let api = MockHealthApi::start().await;
    api.mount_login_rejected("Invalid credentials").await;

    let storage = MemoryStorage::new();
    let manager = SessionManager::new(&api.config(), Arc::new(storage.clone()))?;
    let err = manager
        .login(TEST_DOCTOR_EMAIL, &test_password())
        .await
        .unwrap_err();

    assert!(
        matches!(err, ClientError::Unauthorized(ref message) if message == "Invalid credentials"),
        "unexpected error: {err:?}"
    );
    manager.assert_signed_out();
    storage.assert_no_session();
    Ok(())
}

#[tokio::test]
async fn test_concurrent_expiry_renews_once_and_replays_all() -> Result<()> {
    let api = MockHealthApi::start().await;
    api.mount_protected(RECORDS, "T2").await;
    api.mount_refresh(TEST_REFRESH_TOKEN_1, "T2", Duration::from_millis(200), 1)
        .await;

    let storage = stored_patient_session("T1", Some(TEST_REFRESH_TOKEN_1));
    let manager = SessionManager::new(&api.config(), Arc::new(storage.clone()))?;

    let results = join_all((0..3).map(|_| manager.send(ApiRequest::get(RECORDS)))).await;

    for result in results {
        assert_eq!(result?.status(), 200);
    }
    assert_eq!(api.count_requests("/refresh").await, 1);

    let headers = api.bearer_headers(RECORDS).await;
    let replayed = headers
        .iter()
        .filter(|value| value.as_deref() == Some("Bearer T2"))
        .count();
    assert_eq!(replayed, 3, "every request replayed with the new token: {headers:?}");

    storage
        .assert_slot(ACCESS_TOKEN_SLOT, "T2")
        .assert_slot(REFRESH_TOKEN_SLOT, TEST_REFRESH_TOKEN_1);
    manager.assert_last_event(SessionEvent::Renewed);

    let status = manager.coordinator_status().await?;
    assert!(!status.refreshing);
    assert_eq!(status.renewals_started, 1);
    Ok(())
}

#[tokio::test]
async fn test_renewal_failure_forces_logout() -> Result<()> {
    let api = MockHealthApi::start().await;
    api.mount_protected(RECORDS, "T2").await;
    api.mount_refresh_failure(401, 1).await;

    let storage = stored_patient_session("T1", Some(TEST_REFRESH_TOKEN_1));
    let manager = SessionManager::new(&api.config(), Arc::new(storage.clone()))?;
    let mut guard = manager.route_guard("/patient");
    assert_eq!(guard.decision(), RouteDecision::Allow);

    let err = manager.send(ApiRequest::get(RECORDS)).await.unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired), "unexpected error: {err:?}");
    manager
        .assert_signed_out()
        .assert_last_event(SessionEvent::ForcedLogout);
    storage.assert_no_session();

    let decision = timeout(Duration::from_secs(1), guard.next_change()).await??;
    assert_eq!(decision, RouteDecision::Redirect("/login".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_replay_rejected_again_does_not_renew_twice() -> Result<()> {
    let api = MockHealthApi::start().await;
    api.mount_protected(RECORDS, "never-issued").await;
    api.mount_refresh(TEST_REFRESH_TOKEN_1, "T2", Duration::ZERO, 1)
        .await;

    let storage = stored_patient_session("T1", Some(TEST_REFRESH_TOKEN_1));
    let manager = SessionManager::new(&api.config(), Arc::new(storage))?;

    let err = manager.send(ApiRequest::get(RECORDS)).await.unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized(_)), "unexpected error: {err:?}");
    assert_eq!(
        api.bearer_headers(RECORDS).await,
        vec![Some("Bearer T1".to_string()), Some("Bearer T2".to_string())]
    );
    assert_eq!(api.count_requests("/refresh").await, 1);
    // Renewal itself succeeded; the session survives.
    manager.assert_signed_in_as(TEST_PATIENT_ID, Role::Patient);
    Ok(())
}

#[tokio::test]
async fn test_missing_refresh_token_ends_session_without_network_call() -> Result<()> {
    let api = MockHealthApi::start().await;
    api.mount_protected(RECORDS, "T2").await;
    api.mount_refresh_failure(500, 0).await;

    let storage = stored_patient_session("T1", None);
    let manager = SessionManager::new(&api.config(), Arc::new(storage.clone()))?;
    manager.assert_signed_in_as(TEST_PATIENT_ID, Role::Patient);

    let err = manager.send(ApiRequest::get(RECORDS)).await.unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired));
    assert_eq!(api.count_requests("/refresh").await, 0);
    manager.assert_signed_out();
    storage.assert_no_session();
    Ok(())
}

#[tokio::test]
async fn test_unauthenticated_request_rejected_without_session() -> Result<()> {
    let api = MockHealthApi::start().await;
    api.mount_protected(RECORDS, "T2").await;

    let manager = SessionManager::new(&api.config(), Arc::new(MemoryStorage::new()))?;
    let err = manager.send(ApiRequest::get(RECORDS)).await.unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired));
    assert_eq!(api.bearer_headers(RECORDS).await, vec![None]);
    manager.assert_last_event(SessionEvent::Restored);
    Ok(())
}

#[tokio::test]
async fn test_restore_is_idempotent_across_managers() -> Result<()> {
    let api = MockHealthApi::start().await;
    let storage = stored_patient_session("T1", Some(TEST_REFRESH_TOKEN_1));

    let first = SessionManager::new(&api.config(), Arc::new(storage.clone()))?;
    let second = SessionManager::new(&api.config(), Arc::new(storage.clone()))?;

    first.assert_signed_in_as(TEST_PATIENT_ID, Role::Patient);
    second.assert_signed_in_as(TEST_PATIENT_ID, Role::Patient);
    assert_eq!(first.restore(), second.restore());
    assert_eq!(first.restore(), first.current_principal());
    storage.assert_holds_session();
    Ok(())
}

#[tokio::test]
async fn test_logout_revokes_and_clears() -> Result<()> {
    let api = MockHealthApi::start().await;
    api.mount_logout().await;

    let storage = stored_patient_session("T1", Some(TEST_REFRESH_TOKEN_1));
    let manager = SessionManager::new(&api.config(), Arc::new(storage.clone()))?;
    let mut receiver = manager.subscribe();

    manager.logout().await?;

    manager
        .assert_signed_out()
        .assert_last_event(SessionEvent::LoggedOut);
    storage.assert_no_session();
    assert_eq!(api.count_requests("/logout").await, 1);

    let snapshot = timeout(Duration::from_secs(1), receiver.changed()).await??;
    assert_eq!(snapshot.event(), SessionEvent::LoggedOut);
    assert_eq!(
        manager.evaluate_route("/patient"),
        RouteDecision::Redirect("/login".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_service_errors_are_caller_visible() -> Result<()> {
    let api = MockHealthApi::start().await;
    api.mount_error("/doctor/records/7/history", 404, "Record not found")
        .await;
    api.mount_refresh_failure(500, 0).await;

    let storage = stored_patient_session("T1", Some(TEST_REFRESH_TOKEN_1));
    let manager = SessionManager::new(&api.config(), Arc::new(storage))?;

    let err = manager.send(endpoints::record_history(7)).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(
        matches!(err, ClientError::Api { ref message, .. } if message == "Record not found"),
        "unexpected error: {err:?}"
    );
    manager.assert_signed_in_as(TEST_PATIENT_ID, Role::Patient);
    Ok(())
}

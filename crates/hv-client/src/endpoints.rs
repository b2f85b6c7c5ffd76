//! Request builders for the health-record API.
//!
//! Each function returns an [`ApiRequest`] relative to the API base URL, to
//! be sent through [`crate::SessionManager::send`] so that it is stamped,
//! renewed and replayed like any other call. Nothing here touches the
//! network or the session.

use crate::authorizer::ApiRequest;
use crate::errors::ClientError;
use chrono::NaiveDate;
use common::secret::{ExposeSecret, SecretString};
use common::types::{Role, UserId};
use serde::Serialize;

/// Minimum password length the service accepts at registration.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Default audit log page.
pub const DEFAULT_AUDIT_PAGE: u32 = 1;

/// Default audit log page size.
pub const DEFAULT_AUDIT_PAGE_SIZE: u32 = 20;

/// Date format of the audit filter's `from_date` / `to_date`.
const AUDIT_DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Account
// =============================================================================

/// Self-registration form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: SecretString,
    pub role: Role,
}

#[derive(Serialize)]
struct RegistrationBody<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
    role: &'a str,
}

/// `POST /register`.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` for an admin role, a blank name or
/// email, or a password shorter than [`MIN_PASSWORD_LENGTH`].
pub fn register(registration: &Registration) -> Result<ApiRequest, ClientError> {
    if registration.role == Role::Admin {
        return Err(ClientError::InvalidInput(
            "role must be 'doctor' or 'patient'".to_string(),
        ));
    }
    if registration.name.trim().is_empty() || registration.email.trim().is_empty() {
        return Err(ClientError::InvalidInput(
            "name and email are required".to_string(),
        ));
    }
    if registration.password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ClientError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    ApiRequest::post("/register").with_json(&RegistrationBody {
        name: registration.name.trim(),
        email: registration.email.trim(),
        password: registration.password.expose_secret(),
        role: registration.role.as_str(),
    })
}

/// `POST /password-reset/request`.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` for a blank email.
pub fn request_password_reset(email: &str) -> Result<ApiRequest, ClientError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ClientError::InvalidInput("email is required".to_string()));
    }
    ApiRequest::post("/password-reset/request").with_json(&serde_json::json!({ "email": email }))
}

/// `POST /password-reset/confirm`.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` for a password shorter than
/// [`MIN_PASSWORD_LENGTH`].
pub fn confirm_password_reset(
    reset_token: &SecretString,
    new_password: &SecretString,
) -> Result<ApiRequest, ClientError> {
    if new_password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ClientError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    ApiRequest::post("/password-reset/confirm").with_json(&serde_json::json!({
        "token": reset_token.expose_secret(),
        "new_password": new_password.expose_secret(),
    }))
}

// =============================================================================
// Doctor
// =============================================================================

/// New medical record.
#[derive(Debug, Clone, Serialize)]
pub struct NewRecord {
    pub patient_id: UserId,
    pub diagnosis: String,
    pub treatment: String,
}

/// Replacement contents of a medical record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordUpdate {
    pub diagnosis: String,
    pub treatment: String,
}

/// `GET /doctor/dashboard`.
#[must_use]
pub fn doctor_dashboard() -> ApiRequest {
    ApiRequest::get("/doctor/dashboard")
}

/// `POST /doctor/records`.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` if diagnosis or treatment is blank.
pub fn create_record(record: &NewRecord) -> Result<ApiRequest, ClientError> {
    require_record_text(&record.diagnosis, &record.treatment)?;
    ApiRequest::post("/doctor/records").with_json(record)
}

/// `PUT /doctor/records/{id}`. The service keeps the previous version.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` if diagnosis or treatment is blank.
pub fn update_record(record_id: u64, update: &RecordUpdate) -> Result<ApiRequest, ClientError> {
    require_record_text(&update.diagnosis, &update.treatment)?;
    ApiRequest::put(format!("/doctor/records/{record_id}")).with_json(update)
}

/// `DELETE /doctor/records/{id}`.
#[must_use]
pub fn delete_record(record_id: u64) -> ApiRequest {
    ApiRequest::delete(format!("/doctor/records/{record_id}"))
}

/// `GET /doctor/records/{id}/history`.
#[must_use]
pub fn record_history(record_id: u64) -> ApiRequest {
    ApiRequest::get(format!("/doctor/records/{record_id}/history"))
}

/// `GET /doctor/patients/{id}/records`.
#[must_use]
pub fn search_patient_records(patient_id: UserId) -> ApiRequest {
    ApiRequest::get(format!("/doctor/patients/{patient_id}/records"))
}

/// `POST /doctor/records/emergency/{id}` (break-glass access, audited).
#[must_use]
pub fn emergency_access(record_id: u64) -> ApiRequest {
    ApiRequest::post(format!("/doctor/records/emergency/{record_id}"))
}

fn require_record_text(diagnosis: &str, treatment: &str) -> Result<(), ClientError> {
    if diagnosis.trim().is_empty() || treatment.trim().is_empty() {
        return Err(ClientError::InvalidInput(
            "diagnosis and treatment are required".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Patient
// =============================================================================

/// `GET /patient/dashboard`.
#[must_use]
pub fn patient_dashboard() -> ApiRequest {
    ApiRequest::get("/patient/dashboard")
}

/// `GET /patient/records` (the signed-in patient's own records).
#[must_use]
pub fn own_patient_records() -> ApiRequest {
    ApiRequest::get("/patient/records")
}

// =============================================================================
// Admin
// =============================================================================

/// `GET /admin/records`.
#[must_use]
pub fn all_records() -> ApiRequest {
    ApiRequest::get("/admin/records")
}

/// `GET /admin/audit-logs?page=&page_size=`.
///
/// Zero values fall back to [`DEFAULT_AUDIT_PAGE`] / [`DEFAULT_AUDIT_PAGE_SIZE`].
#[must_use]
pub fn audit_logs(page: u32, page_size: u32) -> ApiRequest {
    ApiRequest::get("/admin/audit-logs")
        .with_query("page", page_or_default(page, DEFAULT_AUDIT_PAGE))
        .with_query("page_size", page_or_default(page_size, DEFAULT_AUDIT_PAGE_SIZE))
}

/// Audit log filter. Unset fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub user_id: Option<UserId>,
    pub action: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// `GET /admin/audit-logs/filter`.
#[must_use]
pub fn filter_audit_logs(filter: &AuditLogFilter) -> ApiRequest {
    let mut request = ApiRequest::get("/admin/audit-logs/filter")
        .with_query(
            "page",
            page_or_default(filter.page.unwrap_or_default(), DEFAULT_AUDIT_PAGE),
        )
        .with_query(
            "page_size",
            page_or_default(filter.page_size.unwrap_or_default(), DEFAULT_AUDIT_PAGE_SIZE),
        );

    if let Some(user_id) = filter.user_id {
        request = request.with_query("user_id", user_id);
    }
    if let Some(action) = filter.action.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        request = request.with_query("action", action);
    }
    if let Some(from) = filter.from_date {
        request = request.with_query("from_date", from.format(AUDIT_DATE_FORMAT));
    }
    if let Some(to) = filter.to_date {
        request = request.with_query("to_date", to.format(AUDIT_DATE_FORMAT));
    }
    request
}

/// `GET /admin/audit-logs/verify` (hash-chain verification, server-side).
#[must_use]
pub fn verify_audit_chain() -> ApiRequest {
    ApiRequest::get("/admin/audit-logs/verify")
}

fn page_or_default(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}

// =============================================================================
// Service
// =============================================================================

/// `GET /health`.
#[must_use]
pub fn health() -> ApiRequest {
    ApiRequest::get("/health")
}

//! Session manager - the facade views talk to.
//!
//! Wires the credential store, refresh coordinator, session publisher and
//! route gate together and exposes the operations a host needs:
//! `is_authenticated`, `current_principal`, `login`, `logout`, `send`, and
//! route decisions that follow the session.
//!
//! # Request pipeline
//!
//! ```text
//! send(request)
//!   -> authorize with current token -> transmit
//!   -> 2xx: Ok(response)
//!   -> non-401 failure: Err(Api { status, message })
//!   -> 401 on a retried request: Err(Unauthorized)
//!   -> 401: coordinator.await_renewal -> transmit replay once
//! ```

use crate::auth_api::{AuthApi, TokenRenewer};
use crate::authorizer::{authorize, ApiRequest, ApiResponse};
use crate::config::Config;
use crate::coordinator::{CoordinatorStatus, RefreshCoordinatorHandle};
use crate::credential_store::{CredentialStore, Session};
use crate::errors::{is_authorization_failure_status, service_error_message, ClientError};
use crate::publisher::{SessionPublisher, SessionReceiver, SessionSnapshot};
use crate::route_gate::{home_for, RouteDecision, RouteGuard, RouteTable};
use crate::storage::{FileStorage, MemoryStorage, SessionStorage};
use common::jwt::decode_access_claims;
use common::secret::{ExposeSecret, SecretString};
use common::types::Principal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Storage backend selected by `config`: the session file if one is
/// configured, process memory otherwise.
#[must_use]
pub fn session_storage(config: &Config) -> Arc<dyn SessionStorage> {
    match &config.session_file {
        Some(path) => Arc::new(FileStorage::new(path)),
        None => Arc::new(MemoryStorage::new()),
    }
}

/// Session lifecycle facade.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    auth_api: AuthApi,
    store: Arc<CredentialStore>,
    publisher: SessionPublisher,
    coordinator: RefreshCoordinatorHandle,
    routes: Arc<RouteTable>,
}

impl SessionManager {
    /// Create a manager that renews through the service's `/refresh`
    /// endpoint, restoring any session held in `storage`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: &Config, storage: Arc<dyn SessionStorage>) -> Result<Self, ClientError> {
        let http = build_http_client(config)?;
        let auth_api = AuthApi::new(http.clone(), config.api_base_url.clone());
        let renewer: Arc<dyn TokenRenewer> = Arc::new(auth_api.clone());
        Ok(Self::assemble(config, http, auth_api, storage, renewer))
    }

    /// Create a manager with a custom renewer.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_renewer(
        config: &Config,
        storage: Arc<dyn SessionStorage>,
        renewer: Arc<dyn TokenRenewer>,
    ) -> Result<Self, ClientError> {
        let http = build_http_client(config)?;
        let auth_api = AuthApi::new(http.clone(), config.api_base_url.clone());
        Ok(Self::assemble(config, http, auth_api, storage, renewer))
    }

    fn assemble(
        config: &Config,
        http: reqwest::Client,
        auth_api: AuthApi,
        storage: Arc<dyn SessionStorage>,
        renewer: Arc<dyn TokenRenewer>,
    ) -> Self {
        let store = Arc::new(CredentialStore::new(storage));
        let publisher = SessionPublisher::new();
        let coordinator =
            RefreshCoordinatorHandle::new(Arc::clone(&store), renewer, publisher.clone());

        let manager = Self {
            http,
            base_url: config.api_base_url.clone(),
            auth_api,
            store,
            publisher,
            coordinator,
            routes: Arc::new(RouteTable::default()),
        };
        manager.restore();
        manager
    }

    /// Replace the route table used by [`SessionManager::route_guard`].
    #[must_use]
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    /// Re-read the session from storage and publish the result.
    ///
    /// Runs once at construction. Calling it again without intervening
    /// writes restores the same session.
    pub fn restore(&self) -> Option<Principal> {
        let session = self.store.load();
        let principal = session.principal().cloned();
        self.publisher.restored(principal.clone());
        principal
    }

    /// Whether the published session is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.publisher.current().is_authenticated()
    }

    /// Principal of the published session.
    #[must_use]
    pub fn current_principal(&self) -> Option<Principal> {
        self.publisher.current().principal().cloned()
    }

    /// Subscribe to session transitions.
    #[must_use]
    pub fn subscribe(&self) -> SessionReceiver {
        self.publisher.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.publisher.current()
    }

    /// Landing route for the current session.
    #[must_use]
    pub fn home_route(&self) -> &'static str {
        home_for(&self.publisher.current())
    }

    /// Evaluate `destination` against the current session.
    #[must_use]
    pub fn evaluate_route(&self, destination: &str) -> RouteDecision {
        self.routes.evaluate(destination, &self.publisher.current())
    }

    /// A guard for `destination` that re-evaluates on every session change.
    #[must_use]
    pub fn route_guard(&self, destination: &str) -> RouteGuard {
        RouteGuard::new(
            Arc::clone(&self.routes),
            self.publisher.subscribe(),
            destination,
        )
    }

    /// Sign in and start a new session.
    ///
    /// The principal is read from the access token's `user_id` and `role`
    /// claims; the email is the one given here.
    ///
    /// # Errors
    ///
    /// - `ClientError::Unauthorized` - credentials rejected (service message)
    /// - `ClientError::InvalidResponse` - token claims unreadable
    /// - `ClientError::Storage` - session could not be persisted
    /// - `ClientError::Http` / `ClientError::Api` - transport or service failure
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Principal, ClientError> {
        let email = email.trim();
        let tokens = self.auth_api.login(email, password).await?;

        let claims = decode_access_claims(tokens.access_token.expose_secret()).map_err(|e| {
            warn!(target: "hv.client", error = %e, "Login returned an unreadable access token");
            ClientError::InvalidResponse(e.to_string())
        })?;
        let principal = claims.into_principal(email);

        self.store.save(Session::authenticated(
            tokens.access_token,
            tokens.refresh_token,
            principal.clone(),
        ))?;
        self.publisher.logged_in(principal.clone());

        info!(
            target: "hv.client",
            user_id = %principal.id,
            role = %principal.role,
            "Signed in"
        );
        Ok(principal)
    }

    /// End the session.
    ///
    /// The refresh token is revoked best-effort; the local session is
    /// cleared and `LoggedOut` published whatever the service answers.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Storage` if the storage slots could not be
    /// removed. The in-memory session is gone either way.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Some(refresh_token) = self.store.refresh_token() {
            let access_token = self.store.access_token();
            if let Err(e) = self
                .auth_api
                .logout(&refresh_token, access_token.as_ref())
                .await
            {
                warn!(target: "hv.client", error = %e, "Refresh token revocation failed");
            }
        }

        let cleared = self.store.clear();
        self.publisher.logged_out();
        cleared.map(|_| ())
    }

    /// Send `request` with the current credentials, renewing and replaying
    /// it once if the service rejects the access token.
    ///
    /// # Errors
    ///
    /// - `ClientError::Api` - non-success status other than 401, with the
    ///   service's `error` message
    /// - `ClientError::Unauthorized` - rejected again after renewal, or the
    ///   request was already a replay
    /// - `ClientError::SessionExpired` - renewal failed; session cleared
    /// - `ClientError::Http` - transport failure
    #[instrument(skip_all, fields(method = %request.method(), path = %request.path()))]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let token = self.store.access_token();
        let stamped = authorize(request, token.as_ref());
        let response = self.transmit(&stamped).await?;

        if !is_authorization_failure_status(response.status()) {
            return into_result(response);
        }

        if stamped.is_retried() {
            debug!(target: "hv.client", "Replayed request rejected, not renewing again");
            return Err(ClientError::Unauthorized(service_error_message(
                response.body(),
            )));
        }

        debug!(target: "hv.client", "Access token rejected, waiting for renewal");
        let replay = self.coordinator.await_renewal(stamped, token).await?;
        let response = self.transmit(&replay).await?;

        if is_authorization_failure_status(response.status()) {
            warn!(target: "hv.client", "Request rejected after renewal");
            return Err(ClientError::Unauthorized(service_error_message(
                response.body(),
            )));
        }
        into_result(response)
    }

    async fn transmit(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        let response = request
            .to_request_builder(&self.http, &self.base_url)
            .send()
            .await
            .map_err(|e| {
                debug!(target: "hv.client", error = %e, "HTTP request failed");
                ClientError::Http(e.to_string())
            })?;
        let response = ApiResponse::read(response).await?;
        debug!(
            target: "hv.client",
            status = response.status(),
            retried = request.is_retried(),
            "Response received"
        );
        Ok(response)
    }

    /// Refresh coordinator status.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Internal` if the coordinator has stopped.
    pub async fn coordinator_status(&self) -> Result<CoordinatorStatus, ClientError> {
        self.coordinator.status().await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.base_url)
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

fn build_http_client(config: &Config) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| ClientError::Configuration(format!("Failed to build HTTP client: {e}")))
}

fn into_result(response: ApiResponse) -> Result<ApiResponse, ClientError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Api {
            status: response.status(),
            message: service_error_message(response.body()),
        })
    }
}

//! Refresh coordinator - single-flight token renewal.
//!
//! The coordinator is an actor that owns the renewal state machine:
//!
//! ```text
//! Idle --(401, refresh token present)--> Refreshing --(renewal done)--> Idle
//!   |                                        |
//!   +--(401, no refresh token)--> forced logout, caller gets SessionExpired
//!                                            +--(401)--> caller joins waiters
//! ```
//!
//! - At most one renewal call is in flight. Every request that fails
//!   authorization while it is in flight joins its waiter list.
//! - On success the new token is committed to the credential store BEFORE
//!   any waiter is released; each waiter gets its request back stamped with
//!   the new token and replays it once.
//! - On failure the store is cleared, `ForcedLogout` is published, and every
//!   waiter receives `ClientError::SessionExpired`. No waiter is dropped.
//! - A 401 that arrives after its expiry was already renewed (the request
//!   was sent with a token that is no longer current) is replayed with the
//!   current token without starting a second renewal.
//!
//! The renewal call itself runs in its own task and reports back on an
//! internal channel, so the actor keeps accepting waiters while it waits.

mod messages;

pub use messages::{CoordinatorStatus, RefreshMessage};

use messages::RenewalOutcome;

use crate::auth_api::TokenRenewer;
use crate::authorizer::{authorize, ApiRequest};
use crate::credential_store::CredentialStore;
use crate::errors::ClientError;
use crate::publisher::SessionPublisher;
use common::secret::{same_secret, SecretString};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the coordinator mailbox.
const COORDINATOR_CHANNEL_BUFFER: usize = 256;

/// Handle to the `RefreshCoordinatorActor`.
///
/// Cheap to clone. The actor stops once every handle is dropped and no
/// renewal is in flight, or when [`RefreshCoordinatorHandle::cancel`] is
/// called.
#[derive(Clone)]
pub struct RefreshCoordinatorHandle {
    sender: mpsc::Sender<RefreshMessage>,
    cancel_token: CancellationToken,
}

impl RefreshCoordinatorHandle {
    /// Spawn the coordinator actor and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        store: Arc<CredentialStore>,
        renewer: Arc<dyn TokenRenewer>,
        publisher: SessionPublisher,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(COORDINATOR_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor =
            RefreshCoordinatorActor::new(receiver, cancel_token.clone(), store, renewer, publisher);

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Wait for a renewed token for `request`, which failed authorization
    /// after being sent with `stale_token`.
    ///
    /// Returns the request marked retried and stamped with the renewed token.
    ///
    /// # Errors
    ///
    /// - `ClientError::SessionExpired` - renewal failed or no refresh token
    ///   was available; the session has been cleared
    /// - `ClientError::Unauthorized` - the session was logged out or replaced
    ///   while the renewal was in flight
    /// - `ClientError::Internal` - the coordinator has stopped
    pub async fn await_renewal(
        &self,
        request: ApiRequest,
        stale_token: Option<SecretString>,
    ) -> Result<ApiRequest, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RefreshMessage::AwaitRenewal {
                request: request.mark_retried(),
                stale_token,
                respond_to: tx,
            })
            .await
            .map_err(|e| ClientError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ClientError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current coordinator status.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Internal` if the coordinator has stopped.
    pub async fn status(&self) -> Result<CoordinatorStatus, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RefreshMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| ClientError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ClientError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop the actor. Pending waiters receive `ClientError::Internal`.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl std::fmt::Debug for RefreshCoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinatorHandle")
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A request suspended until the in-flight renewal completes.
struct PendingRequest {
    request: ApiRequest,
    respond_to: oneshot::Sender<Result<ApiRequest, ClientError>>,
}

impl PendingRequest {
    fn respond(self, result: Result<ApiRequest, ClientError>) {
        if self.respond_to.send(result).is_err() {
            debug!(
                target: "hv.refresh",
                path = %self.request.path(),
                "Waiter went away before renewal completed"
            );
        }
    }
}

enum RefreshState {
    Idle,
    Refreshing {
        epoch: u64,
        /// Refresh token the renewal was started with.
        refresh_token: SecretString,
        waiters: Vec<PendingRequest>,
    },
}

/// The `RefreshCoordinatorActor` implementation.
struct RefreshCoordinatorActor {
    receiver: mpsc::Receiver<RefreshMessage>,
    completions_tx: mpsc::UnboundedSender<RenewalOutcome>,
    completions_rx: mpsc::UnboundedReceiver<RenewalOutcome>,
    cancel_token: CancellationToken,
    store: Arc<CredentialStore>,
    renewer: Arc<dyn TokenRenewer>,
    publisher: SessionPublisher,
    state: RefreshState,
    renewal_task: Option<JoinHandle<()>>,
    /// Incremented for every renewal started; also the count reported in status.
    epoch: u64,
}

impl RefreshCoordinatorActor {
    fn new(
        receiver: mpsc::Receiver<RefreshMessage>,
        cancel_token: CancellationToken,
        store: Arc<CredentialStore>,
        renewer: Arc<dyn TokenRenewer>,
        publisher: SessionPublisher,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            receiver,
            completions_tx,
            completions_rx,
            cancel_token,
            store,
            renewer,
            publisher,
            state: RefreshState::Idle,
            renewal_task: None,
            epoch: 0,
        }
    }

    fn is_refreshing(&self) -> bool {
        matches!(self.state, RefreshState::Refreshing { .. })
    }

    #[instrument(skip_all, name = "hv.refresh.actor")]
    async fn run(mut self) {
        debug!(target: "hv.refresh", "Refresh coordinator started");
        let mut mailbox_open = true;

        loop {
            if !mailbox_open && !self.is_refreshing() {
                break;
            }

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "hv.refresh", "Refresh coordinator cancelled");
                    break;
                }

                message = self.receiver.recv(), if mailbox_open => {
                    match message {
                        Some(message) => self.handle_message(message),
                        None => mailbox_open = false,
                    }
                }

                Some(outcome) = self.completions_rx.recv() => {
                    self.handle_outcome(outcome);
                }
            }
        }

        self.shutdown();
        debug!(target: "hv.refresh", "Refresh coordinator stopped");
    }

    fn handle_message(&mut self, message: RefreshMessage) {
        match message {
            RefreshMessage::AwaitRenewal {
                request,
                stale_token,
                respond_to,
            } => self.handle_await_renewal(
                PendingRequest {
                    request,
                    respond_to,
                },
                stale_token,
            ),
            RefreshMessage::GetStatus { respond_to } => {
                let status = match &self.state {
                    RefreshState::Idle => CoordinatorStatus {
                        refreshing: false,
                        waiters: 0,
                        renewals_started: self.epoch,
                    },
                    RefreshState::Refreshing { waiters, .. } => CoordinatorStatus {
                        refreshing: true,
                        waiters: waiters.len(),
                        renewals_started: self.epoch,
                    },
                };
                let _ = respond_to.send(status);
            }
        }
    }

    fn handle_await_renewal(&mut self, pending: PendingRequest, stale_token: Option<SecretString>) {
        if let RefreshState::Refreshing { waiters, .. } = &mut self.state {
            waiters.push(pending);
            debug!(
                target: "hv.refresh",
                waiters = waiters.len(),
                "Request joined in-flight renewal"
            );
            return;
        }

        let current = self.store.access_token();
        let already_renewed = match (&stale_token, &current) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(stale), Some(current)) => !same_secret(stale, current),
        };
        if already_renewed {
            debug!(
                target: "hv.refresh",
                path = %pending.request.path(),
                "Token already renewed, replaying with current token"
            );
            let PendingRequest {
                request,
                respond_to,
            } = pending;
            let _ = respond_to.send(Ok(authorize(request, current.as_ref())));
            return;
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            warn!(target: "hv.refresh", "No refresh token available, ending session");
            self.end_session();
            pending.respond(Err(ClientError::SessionExpired));
            return;
        };

        self.start_renewal(refresh_token, pending);
    }

    fn start_renewal(&mut self, refresh_token: SecretString, first: PendingRequest) {
        self.epoch += 1;
        let epoch = self.epoch;

        let renewer = Arc::clone(&self.renewer);
        let completions = self.completions_tx.clone();
        let renewal_refresh = refresh_token.clone();
        self.renewal_task = Some(tokio::spawn(async move {
            let result = renewer.renew(&renewal_refresh).await;
            if completions.send(RenewalOutcome { epoch, result }).is_err() {
                debug!(target: "hv.refresh", epoch, "Coordinator gone, renewal result dropped");
            }
        }));

        self.state = RefreshState::Refreshing {
            epoch,
            refresh_token,
            waiters: vec![first],
        };

        info!(target: "hv.refresh", epoch, "Access token renewal started");
    }

    fn handle_outcome(&mut self, outcome: RenewalOutcome) {
        let current_epoch = match &self.state {
            RefreshState::Refreshing { epoch, .. } => *epoch,
            RefreshState::Idle => {
                debug!(target: "hv.refresh", epoch = outcome.epoch, "Renewal result with no renewal in flight");
                return;
            }
        };
        if current_epoch != outcome.epoch {
            debug!(target: "hv.refresh", epoch = outcome.epoch, "Stale renewal result ignored");
            return;
        }

        let RefreshState::Refreshing {
            refresh_token,
            waiters,
            ..
        } = std::mem::replace(&mut self.state, RefreshState::Idle)
        else {
            return;
        };
        self.renewal_task = None;

        match outcome.result {
            Ok(tokens) => {
                let access_token = tokens.access_token.clone();
                match self.store.update_access_token(
                    &refresh_token,
                    tokens.access_token,
                    tokens.refresh_token,
                ) {
                    Ok(true) => {
                        info!(
                            target: "hv.refresh",
                            epoch = outcome.epoch,
                            waiters = waiters.len(),
                            "Access token renewed, replaying requests"
                        );
                        self.publisher.renewed();
                        for PendingRequest {
                            request,
                            respond_to,
                        } in waiters
                        {
                            let _ = respond_to.send(Ok(authorize(request, Some(&access_token))));
                        }
                    }
                    Ok(false) => {
                        warn!(
                            target: "hv.refresh",
                            waiters = waiters.len(),
                            "Session ended during renewal, requests not replayed"
                        );
                        for waiter in waiters {
                            waiter.respond(Err(ClientError::Unauthorized(
                                "session ended during renewal".to_string(),
                            )));
                        }
                    }
                    Err(e) => {
                        error!(target: "hv.refresh", error = %e, "Failed to commit renewed token");
                        self.fail_waiters(&refresh_token, waiters);
                    }
                }
            }
            Err(e) => {
                warn!(
                    target: "hv.refresh",
                    error = %e,
                    waiters = waiters.len(),
                    "Access token renewal failed, ending session"
                );
                self.fail_waiters(&refresh_token, waiters);
            }
        }
    }

    /// End the session the failed renewal belonged to and fail its waiters.
    ///
    /// A session logged in since the renewal started holds a different
    /// refresh token and is left alone.
    fn fail_waiters(&self, renewed_with: &SecretString, waiters: Vec<PendingRequest>) {
        match self.store.clear_if_refresh(renewed_with) {
            Ok(true) => self.publisher.forced_logout(),
            Ok(false) => debug!(target: "hv.refresh", "Session replaced during renewal, left in place"),
            Err(e) => {
                error!(target: "hv.refresh", error = %e, "Failed to clear session storage");
                self.publisher.forced_logout();
            }
        }
        for waiter in waiters {
            waiter.respond(Err(ClientError::SessionExpired));
        }
    }

    /// Clear the store and publish a forced logout if a session existed.
    fn end_session(&self) {
        match self.store.clear() {
            Ok(true) => self.publisher.forced_logout(),
            Ok(false) => debug!(target: "hv.refresh", "No session to end"),
            Err(e) => {
                error!(target: "hv.refresh", error = %e, "Failed to clear session storage");
                self.publisher.forced_logout();
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.renewal_task.take() {
            task.abort();
        }
        if let RefreshState::Refreshing { waiters, .. } =
            std::mem::replace(&mut self.state, RefreshState::Idle)
        {
            for waiter in waiters {
                waiter.respond(Err(ClientError::Internal(
                    "refresh coordinator stopped".to_string(),
                )));
            }
        }
    }
}

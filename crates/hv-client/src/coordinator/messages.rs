//! Message types for the refresh coordinator actor.
//!
//! Callers talk to the actor over `tokio::sync::mpsc` and get their answer
//! on a `tokio::sync::oneshot`. Renewal results come back on a separate
//! internal channel, tagged with the epoch of the renewal that produced them.

use crate::auth_api::RenewedTokens;
use crate::authorizer::ApiRequest;
use crate::errors::ClientError;
use common::secret::SecretString;
use tokio::sync::oneshot;

/// Messages sent to `RefreshCoordinatorActor`.
#[derive(Debug)]
pub enum RefreshMessage {
    /// A request failed authorization and wants to be replayed with a
    /// renewed token.
    AwaitRenewal {
        /// The failed request, already marked retried.
        request: ApiRequest,
        /// Access token the request was sent with.
        stale_token: Option<SecretString>,
        /// Receives the re-authorized request, or a terminal failure.
        respond_to: oneshot::Sender<Result<ApiRequest, ClientError>>,
    },

    /// Get coordinator status (for tests and diagnostics).
    GetStatus {
        /// Response channel for coordinator status.
        respond_to: oneshot::Sender<CoordinatorStatus>,
    },
}

/// Coordinator status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStatus {
    /// Whether a renewal is in flight.
    pub refreshing: bool,
    /// Requests waiting on the in-flight renewal.
    pub waiters: usize,
    /// Renewal calls started since the coordinator was created.
    pub renewals_started: u64,
}

/// Result of one renewal call, reported by the renewal task.
#[derive(Debug)]
pub(crate) struct RenewalOutcome {
    pub epoch: u64,
    pub result: Result<RenewedTokens, ClientError>,
}

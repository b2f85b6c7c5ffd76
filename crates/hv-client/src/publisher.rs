//! Session state publisher.
//!
//! The one place views learn who is signed in. Every transition (restore,
//! login, silent renewal, logout, forced logout) replaces the published
//! [`SessionSnapshot`] and wakes subscribers, which re-render or re-run the
//! route gate.
//!
//! Built on a `tokio::sync::watch` channel: subscribers always see the most
//! recent snapshot, and a slow subscriber skips intermediate ones instead of
//! queueing them.

use crate::errors::ClientError;
use common::types::Principal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The transition that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Stored session not read yet.
    Loading,
    /// Stored session read at startup (possibly empty).
    Restored,
    /// Explicit login succeeded.
    LoggedIn,
    /// Access token silently renewed; principal unchanged.
    Renewed,
    /// Explicit logout.
    LoggedOut,
    /// Renewal failed and the session was torn down.
    ForcedLogout,
}

/// Published session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    principal: Option<Principal>,
    event: SessionEvent,
    generation: u64,
}

impl SessionSnapshot {
    fn loading() -> Self {
        Self {
            principal: None,
            event: SessionEvent::Loading,
            generation: 0,
        }
    }

    /// Build a snapshot directly, for tests and hosts that gate routes
    /// without a running manager.
    #[must_use]
    pub fn new(principal: Option<Principal>, event: SessionEvent) -> Self {
        Self {
            principal,
            event,
            generation: 0,
        }
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    #[must_use]
    pub fn event(&self) -> SessionEvent {
        self.event
    }

    /// Number of transitions published before this one.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// Whether the stored session has been read.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.event != SessionEvent::Loading
    }
}

/// Publishing side. Clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct SessionPublisher {
    sender: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for SessionPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPublisher {
    /// Create a publisher in the `Loading` state.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SessionSnapshot::loading());
        Self {
            sender: Arc::new(sender),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> SessionReceiver {
        SessionReceiver(self.sender.subscribe())
    }

    #[must_use]
    pub fn current(&self) -> SessionSnapshot {
        self.sender.borrow().clone()
    }

    fn publish(&self, principal: Option<Principal>, event: SessionEvent) {
        self.sender.send_modify(|snapshot| {
            snapshot.principal = principal;
            snapshot.event = event;
            snapshot.generation += 1;
        });
        debug!(
            target: "hv.session",
            event = ?event,
            subscribers = self.sender.receiver_count(),
            "Session state published"
        );
    }

    /// Startup restore finished.
    pub fn restored(&self, principal: Option<Principal>) {
        if let Some(p) = &principal {
            info!(target: "hv.session", user_id = %p.id, role = %p.role, "Session restored");
        } else {
            debug!(target: "hv.session", "No session to restore");
        }
        self.publish(principal, SessionEvent::Restored);
    }

    pub fn logged_in(&self, principal: Principal) {
        info!(target: "hv.session", user_id = %principal.id, role = %principal.role, "Logged in");
        self.publish(Some(principal), SessionEvent::LoggedIn);
    }

    /// Silent renewal committed. The principal is carried over unchanged.
    pub fn renewed(&self) {
        let principal = self.sender.borrow().principal.clone();
        self.publish(principal, SessionEvent::Renewed);
    }

    pub fn logged_out(&self) {
        info!(target: "hv.session", "Logged out");
        self.publish(None, SessionEvent::LoggedOut);
    }

    pub fn forced_logout(&self) {
        warn!(target: "hv.session", "Session ended by failed renewal");
        self.publish(None, SessionEvent::ForcedLogout);
    }
}

/// Subscriber side of the session publisher.
#[derive(Debug, Clone)]
pub struct SessionReceiver(watch::Receiver<SessionSnapshot>);

impl SessionReceiver {
    /// Latest published snapshot.
    #[must_use]
    pub fn current(&self) -> SessionSnapshot {
        self.0.borrow().clone()
    }

    /// Wait for the next published transition and mark it seen.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Internal` if every publisher has been dropped.
    pub async fn changed(&mut self) -> Result<SessionSnapshot, ClientError> {
        self.0
            .changed()
            .await
            .map_err(|_| ClientError::Internal("session publisher closed".to_string()))?;
        Ok(self.0.borrow_and_update().clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::{Role, UserId};
    use std::time::Duration;
    use tokio::time::timeout;

    fn admin() -> Principal {
        Principal::new(UserId(1), Role::Admin, "admin@example.com")
    }

    #[test]
    fn test_starts_loading() {
        let publisher = SessionPublisher::new();
        let snapshot = publisher.current();

        assert_eq!(snapshot.event(), SessionEvent::Loading);
        assert!(!snapshot.is_ready());
        assert!(!snapshot.is_authenticated());
        assert_eq!(snapshot.generation(), 0);
    }

    #[test]
    fn test_transitions_update_principal() {
        let publisher = SessionPublisher::new();
        publisher.restored(None);
        assert!(publisher.current().is_ready());
        assert!(!publisher.current().is_authenticated());

        publisher.logged_in(admin());
        assert_eq!(publisher.current().principal(), Some(&admin()));

        publisher.renewed();
        let snapshot = publisher.current();
        assert_eq!(snapshot.event(), SessionEvent::Renewed);
        assert_eq!(snapshot.principal(), Some(&admin()), "renewal keeps principal");

        publisher.forced_logout();
        let snapshot = publisher.current();
        assert_eq!(snapshot.event(), SessionEvent::ForcedLogout);
        assert!(!snapshot.is_authenticated());
        assert_eq!(snapshot.generation(), 4);
    }

    #[tokio::test]
    async fn test_subscriber_notified() {
        let publisher = SessionPublisher::new();
        let mut receiver = publisher.subscribe();

        publisher.logged_in(admin());

        let snapshot = timeout(Duration::from_secs(1), receiver.changed())
            .await
            .expect("notification")
            .unwrap();
        assert_eq!(snapshot.event(), SessionEvent::LoggedIn);
        assert_eq!(receiver.current(), snapshot);
    }

    #[tokio::test]
    async fn test_identical_transitions_still_notify() {
        let publisher = SessionPublisher::new();
        publisher.restored(None);
        let mut receiver = publisher.subscribe();

        publisher.logged_out();

        let snapshot = timeout(Duration::from_secs(1), receiver.changed())
            .await
            .expect("notification")
            .unwrap();
        assert_eq!(snapshot.event(), SessionEvent::LoggedOut);
    }

    #[tokio::test]
    async fn test_closed_publisher_reports_error() {
        let publisher = SessionPublisher::new();
        let mut receiver = publisher.subscribe();
        drop(publisher);

        assert!(matches!(
            receiver.changed().await,
            Err(ClientError::Internal(_))
        ));
    }
}

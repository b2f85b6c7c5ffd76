//! Route authorization gate.
//!
//! Decides whether a view is reachable for the current session and where to
//! send the user otherwise. [`RouteTable::evaluate`] is a pure function of
//! (destination, session snapshot); [`RouteGuard`] re-runs it every time the
//! session publisher reports a change.
//!
//! # Rules
//!
//! | Session | Destination | Decision |
//! |---------|-------------|----------|
//! | not restored yet | any | `Pending` |
//! | any | public | `Allow` |
//! | none | protected | redirect to `/login` |
//! | role differs | role-restricted | redirect to `/login` |
//! | role matches | role-restricted | `Allow` |
//! | some | unknown | redirect to the role home |
//! | none | unknown | redirect to `/login` |
//!
//! A wrong role goes to the entry point rather than the user's own home.

use crate::errors::ClientError;
use crate::publisher::{SessionReceiver, SessionSnapshot};
use common::types::Role;
use std::sync::Arc;
use tracing::debug;

/// Unauthenticated entry point.
pub const LOGIN_ROUTE: &str = "/login";

/// Who may reach a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Reachable with or without a session.
    Public,
    /// Any signed-in user.
    Authenticated,
    /// Only users holding this role.
    Role(Role),
}

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Render the destination.
    Allow,
    /// Navigate to this route instead (replacing the history entry).
    Redirect(String),
    /// Stored session not read yet; render nothing.
    Pending,
}

/// Known destinations and their access rules.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, RouteAccess)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        let mut table = Self::empty()
            .with_route(LOGIN_ROUTE, RouteAccess::Public)
            .with_route("/register", RouteAccess::Public)
            .with_route("/forgot-password", RouteAccess::Public);
        for role in Role::ALL {
            table = table.with_route(role.home_route(), RouteAccess::Role(role));
        }
        table
    }
}

impl RouteTable {
    /// A table with no routes; every destination is unknown.
    #[must_use]
    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    /// Add or replace a route.
    #[must_use]
    pub fn with_route(mut self, path: &str, access: RouteAccess) -> Self {
        let path = normalize(path);
        self.routes.retain(|(existing, _)| *existing != path);
        self.routes.push((path, access));
        self
    }

    /// Access rule for `destination`, if it is a known route.
    #[must_use]
    pub fn access_for(&self, destination: &str) -> Option<RouteAccess> {
        let path = normalize(destination);
        self.routes
            .iter()
            .find(|(route, _)| *route == path)
            .map(|(_, access)| *access)
    }

    /// Decide whether `destination` is reachable in `session`.
    #[must_use]
    pub fn evaluate(&self, destination: &str, session: &SessionSnapshot) -> RouteDecision {
        if !session.is_ready() {
            return RouteDecision::Pending;
        }

        let principal = session.principal();
        let decision = match (self.access_for(destination), principal) {
            (Some(RouteAccess::Public), _) => RouteDecision::Allow,
            (Some(RouteAccess::Authenticated | RouteAccess::Role(_)), None) => {
                RouteDecision::Redirect(LOGIN_ROUTE.to_string())
            }
            (Some(RouteAccess::Authenticated), Some(_)) => RouteDecision::Allow,
            (Some(RouteAccess::Role(required)), Some(principal)) => {
                if principal.role == required {
                    RouteDecision::Allow
                } else {
                    RouteDecision::Redirect(LOGIN_ROUTE.to_string())
                }
            }
            (None, _) => RouteDecision::Redirect(home_for(session).to_string()),
        };

        debug!(
            target: "hv.routes",
            destination = %destination,
            decision = ?decision,
            "Route evaluated"
        );
        decision
    }
}

/// Where a user lands by default: their role home, or the entry point.
#[must_use]
pub fn home_for(session: &SessionSnapshot) -> &'static str {
    session
        .principal()
        .map_or(LOGIN_ROUTE, |principal| principal.role.home_route())
}

/// Drop query string and fragment, trim trailing slashes, ensure a leading
/// slash.
fn normalize(destination: &str) -> String {
    let path = destination
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim();
    let path = path.trim_end_matches('/');
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Gate for one destination that follows session changes.
#[derive(Debug)]
pub struct RouteGuard {
    table: Arc<RouteTable>,
    receiver: SessionReceiver,
    destination: String,
}

impl RouteGuard {
    #[must_use]
    pub fn new(table: Arc<RouteTable>, receiver: SessionReceiver, destination: &str) -> Self {
        Self {
            table,
            receiver,
            destination: destination.to_string(),
        }
    }

    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Decision for the current session.
    #[must_use]
    pub fn decision(&self) -> RouteDecision {
        self.table
            .evaluate(&self.destination, &self.receiver.current())
    }

    /// Switch to a new destination and evaluate it.
    pub fn navigate(&mut self, destination: &str) -> RouteDecision {
        self.destination = destination.to_string();
        self.decision()
    }

    /// Wait for the next session change and re-evaluate.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Internal` if the session publisher is gone.
    pub async fn next_change(&mut self) -> Result<RouteDecision, ClientError> {
        let snapshot = self.receiver.changed().await?;
        Ok(self.table.evaluate(&self.destination, &snapshot))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::publisher::{SessionEvent, SessionPublisher};
    use common::types::{Principal, UserId};
    use std::time::Duration;
    use tokio::time::timeout;

    fn signed_in(role: Role) -> SessionSnapshot {
        SessionSnapshot::new(
            Some(Principal::new(UserId(1), role, "u@example.com")),
            SessionEvent::LoggedIn,
        )
    }

    fn signed_out() -> SessionSnapshot {
        SessionSnapshot::new(None, SessionEvent::Restored)
    }

    fn redirect(to: &str) -> RouteDecision {
        RouteDecision::Redirect(to.to_string())
    }

    #[test]
    fn test_doctor_requesting_admin_redirects_to_login() {
        let table = RouteTable::default();
        assert_eq!(
            table.evaluate("/admin", &signed_in(Role::Doctor)),
            redirect("/login")
        );
    }

    #[test]
    fn test_role_gate_symmetry() {
        let table = RouteTable::default();
        for holder in Role::ALL {
            for target in Role::ALL {
                let decision = table.evaluate(target.home_route(), &signed_in(holder));
                if holder == target {
                    assert_eq!(decision, RouteDecision::Allow, "{holder} -> {target}");
                } else {
                    assert_eq!(decision, redirect(LOGIN_ROUTE), "{holder} -> {target}");
                }
            }
        }
    }

    #[test]
    fn test_no_session_redirects_protected_routes_to_login() {
        let table = RouteTable::default();
        for role in Role::ALL {
            assert_eq!(
                table.evaluate(role.home_route(), &signed_out()),
                redirect(LOGIN_ROUTE)
            );
        }
    }

    #[test]
    fn test_public_routes_always_allowed() {
        let table = RouteTable::default();
        for route in ["/login", "/register", "/forgot-password"] {
            assert_eq!(table.evaluate(route, &signed_out()), RouteDecision::Allow);
            assert_eq!(
                table.evaluate(route, &signed_in(Role::Admin)),
                RouteDecision::Allow
            );
        }
    }

    #[test]
    fn test_unknown_destination_goes_home() {
        let table = RouteTable::default();
        assert_eq!(
            table.evaluate("/", &signed_in(Role::Patient)),
            redirect("/patient")
        );
        assert_eq!(
            table.evaluate("/nowhere", &signed_in(Role::Admin)),
            redirect("/admin")
        );
        assert_eq!(table.evaluate("/nowhere", &signed_out()), redirect("/login"));
    }

    #[test]
    fn test_loading_is_pending() {
        let table = RouteTable::default();
        let loading = SessionPublisher::new().current();
        assert_eq!(table.evaluate("/doctor", &loading), RouteDecision::Pending);
        assert_eq!(table.evaluate("/login", &loading), RouteDecision::Pending);
    }

    #[test]
    fn test_destination_normalization() {
        let table = RouteTable::default();
        let doctor = signed_in(Role::Doctor);
        assert_eq!(table.evaluate("/doctor/", &doctor), RouteDecision::Allow);
        assert_eq!(table.evaluate("/doctor?tab=history", &doctor), RouteDecision::Allow);
        assert_eq!(table.evaluate("doctor#top", &doctor), RouteDecision::Allow);
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("///"), "/");
    }

    #[test]
    fn test_authenticated_access_and_custom_routes() {
        let table = RouteTable::empty()
            .with_route("/profile", RouteAccess::Authenticated)
            .with_route("/profile/", RouteAccess::Role(Role::Admin));

        // Second registration replaced the first.
        assert_eq!(
            table.access_for("/profile"),
            Some(RouteAccess::Role(Role::Admin))
        );

        let table = RouteTable::empty().with_route("/profile", RouteAccess::Authenticated);
        assert_eq!(
            table.evaluate("/profile", &signed_in(Role::Patient)),
            RouteDecision::Allow
        );
        assert_eq!(table.evaluate("/profile", &signed_out()), redirect("/login"));
    }

    #[test]
    fn test_home_for() {
        assert_eq!(home_for(&signed_in(Role::Doctor)), "/doctor");
        assert_eq!(home_for(&signed_out()), "/login");
    }

    #[tokio::test]
    async fn test_guard_reevaluates_on_session_change() {
        let publisher = SessionPublisher::new();
        let mut guard = RouteGuard::new(
            Arc::new(RouteTable::default()),
            publisher.subscribe(),
            "/admin",
        );
        assert_eq!(guard.decision(), RouteDecision::Pending);

        publisher.restored(None);
        let decision = timeout(Duration::from_secs(1), guard.next_change())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision, redirect("/login"));

        publisher.logged_in(Principal::new(UserId(1), Role::Admin, "a@example.com"));
        let decision = timeout(Duration::from_secs(1), guard.next_change())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision, RouteDecision::Allow);

        publisher.forced_logout();
        let decision = timeout(Duration::from_secs(1), guard.next_change())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision, redirect("/login"));
    }

    #[test]
    fn test_guard_navigate() {
        let publisher = SessionPublisher::new();
        publisher.logged_in(Principal::new(UserId(2), Role::Doctor, "d@example.com"));
        let mut guard = RouteGuard::new(
            Arc::new(RouteTable::default()),
            publisher.subscribe(),
            "/doctor",
        );

        assert_eq!(guard.decision(), RouteDecision::Allow);
        assert_eq!(guard.navigate("/patient"), redirect("/login"));
        assert_eq!(guard.destination(), "/patient");
    }
}

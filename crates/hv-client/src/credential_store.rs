//! Credential store.
//!
//! The single owner of the session credentials. Every writer (login, renewal
//! success, renewal failure, logout) goes through this type; everything else
//! reads a copy.
//!
//! # Persisted layout
//!
//! Three named slots, always written and cleared together:
//!
//! | Slot | Contents |
//! |------|----------|
//! | `access_token` | bearer credential |
//! | `refresh_token` | renewal credential (may be absent) |
//! | `user` | principal serialized as JSON |
//!
//! # Invariant
//!
//! A principal is present if and only if an access token is present.
//! [`Session`] enforces this through its constructors, and [`CredentialStore::load`]
//! refuses persisted data that violates it.

use crate::errors::ClientError;
use crate::storage::SessionStorage;
use common::secret::{same_secret, ExposeSecret, SecretString};
use common::types::Principal;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Storage slot holding the access token.
pub const ACCESS_TOKEN_SLOT: &str = "access_token";

/// Storage slot holding the refresh token.
pub const REFRESH_TOKEN_SLOT: &str = "refresh_token";

/// Storage slot holding the serialized principal.
pub const PRINCIPAL_SLOT: &str = "user";

/// Every slot owned by the session, cleared together.
pub const SESSION_SLOTS: [&str; 3] = [ACCESS_TOKEN_SLOT, REFRESH_TOKEN_SLOT, PRINCIPAL_SLOT];

// =============================================================================
// Session
// =============================================================================

/// Session credentials: either empty, or an access token with its principal
/// and an optional refresh token.
#[derive(Clone, Default)]
pub struct Session {
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    principal: Option<Principal>,
}

impl Session {
    /// A session with nothing in it.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// An authenticated session.
    #[must_use]
    pub fn authenticated(
        access_token: SecretString,
        refresh_token: Option<SecretString>,
        principal: Principal,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token,
            principal: Some(principal),
        }
    }

    /// Whether the session holds credentials.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.principal.is_some()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("principal", &self.principal)
            .finish()
    }
}

// =============================================================================
// CredentialStore
// =============================================================================

/// Owner of the session credentials and their persisted copy.
///
/// The in-memory session and the storage slots are updated under one write
/// lock, so readers never observe a half-applied login, renewal or clear.
pub struct CredentialStore {
    storage: Arc<dyn SessionStorage>,
    session: RwLock<Session>,
}

impl CredentialStore {
    /// Create a store over `storage`. The in-memory session starts empty
    /// until [`CredentialStore::load`] is called.
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            storage,
            session: RwLock::new(Session::empty()),
        }
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restore the session from storage.
    ///
    /// Never fails: unreadable storage, a corrupt principal or a partial set
    /// of slots all restore as an empty session. Partial or corrupt data is
    /// removed (best-effort) so the next start sees a clean slate.
    ///
    /// Calling this repeatedly without intervening writes yields the same
    /// session each time.
    pub fn load(&self) -> Session {
        let mut current = self.write_session();

        let slots = match self.storage.read() {
            Ok(slots) => slots,
            Err(e) => {
                warn!(target: "hv.store", error = %e, "Session storage unreadable, starting signed out");
                *current = Session::empty();
                return Session::empty();
            }
        };

        let access = slots
            .get(ACCESS_TOKEN_SLOT)
            .filter(|value| !value.is_empty());
        let user = slots.get(PRINCIPAL_SLOT).filter(|value| !value.is_empty());
        let refresh = slots
            .get(REFRESH_TOKEN_SLOT)
            .filter(|value| !value.is_empty());

        let restored = match (access, user) {
            (Some(access), Some(user)) => match serde_json::from_str::<Principal>(user) {
                Ok(principal) => Some(Session::authenticated(
                    SecretString::from(access.clone()),
                    refresh.cloned().map(SecretString::from),
                    principal,
                )),
                Err(e) => {
                    warn!(target: "hv.store", error = %e, "Stored principal is corrupt, discarding session");
                    None
                }
            },
            (None, None) if refresh.is_none() => {
                debug!(target: "hv.store", "No stored session");
                *current = Session::empty();
                return Session::empty();
            }
            _ => {
                warn!(
                    target: "hv.store",
                    has_access_token = access.is_some(),
                    has_principal = user.is_some(),
                    has_refresh_token = refresh.is_some(),
                    "Stored session is incomplete, discarding"
                );
                None
            }
        };

        match restored {
            Some(session) => {
                if let Some(principal) = session.principal() {
                    info!(
                        target: "hv.store",
                        user_id = %principal.id,
                        role = %principal.role,
                        "Session restored from storage"
                    );
                }
                *current = session.clone();
                session
            }
            None => {
                if let Err(e) = self.storage.remove(&SESSION_SLOTS) {
                    warn!(target: "hv.store", error = %e, "Failed to discard stored session");
                }
                *current = Session::empty();
                Session::empty()
            }
        }
    }

    /// Persist `session` and make it current.
    ///
    /// All three slots are written in one storage update; a slot the session
    /// does not carry is removed in that same update. Saving an empty
    /// session is equivalent to [`CredentialStore::clear`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Storage` if the slots could not be written or
    /// the principal could not be serialized. The current session is left
    /// unchanged on error.
    pub fn save(&self, session: Session) -> Result<(), ClientError> {
        if !session.is_active() {
            return self.clear().map(|_| ());
        }

        let mut current = self.write_session();

        let mut set = Vec::with_capacity(3);
        let mut remove = Vec::new();

        if let Some(access) = session.access_token() {
            set.push((ACCESS_TOKEN_SLOT, access.expose_secret().to_string()));
        }
        match session.refresh_token() {
            Some(refresh) => set.push((REFRESH_TOKEN_SLOT, refresh.expose_secret().to_string())),
            None => remove.push(REFRESH_TOKEN_SLOT),
        }
        if let Some(principal) = session.principal() {
            let user = serde_json::to_string(principal)
                .map_err(|e| ClientError::Storage(format!("failed to serialize principal: {e}")))?;
            set.push((PRINCIPAL_SLOT, user));
        }

        self.storage.apply(&set, &remove)?;
        *current = session;

        debug!(target: "hv.store", "Session saved");
        Ok(())
    }

    /// Remove every session slot and empty the in-memory session.
    ///
    /// Returns whether a session was active before the call. The in-memory
    /// session is emptied even when the storage update fails, so a failed
    /// clear never leaves credentials usable.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Storage` if the slots could not be removed.
    pub fn clear(&self) -> Result<bool, ClientError> {
        let mut current = self.write_session();
        let was_active = current.is_active();
        *current = Session::empty();

        self.storage.remove(&SESSION_SLOTS)?;

        debug!(target: "hv.store", was_active, "Session cleared");
        Ok(was_active)
    }

    /// Clear the session only if it still holds `renewed_with` as its
    /// refresh token.
    ///
    /// Returns `false` without touching anything when the session was logged
    /// out or replaced since the renewal started. Otherwise behaves like
    /// [`CredentialStore::clear`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Storage` if the slots could not be removed.
    pub fn clear_if_refresh(&self, renewed_with: &SecretString) -> Result<bool, ClientError> {
        let mut current = self.write_session();
        if !holds_refresh(&current, renewed_with) {
            debug!(target: "hv.store", "Session changed during renewal, not cleared");
            return Ok(false);
        }
        *current = Session::empty();

        self.storage.remove(&SESSION_SLOTS)?;

        debug!(target: "hv.store", "Session cleared after failed renewal");
        Ok(true)
    }

    /// Replace the access token (and the refresh token when the service
    /// rotated it), leaving the principal untouched.
    ///
    /// `renewed_with` is the refresh token the renewal was performed with.
    /// The update applies only while that token is still the current one;
    /// returns `false` without writing anything when the session was logged
    /// out or replaced while the renewal was in flight.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Storage` if the slots could not be written. The
    /// current session is left unchanged on error.
    pub fn update_access_token(
        &self,
        renewed_with: &SecretString,
        access_token: SecretString,
        rotated_refresh: Option<SecretString>,
    ) -> Result<bool, ClientError> {
        let mut current = self.write_session();
        if !holds_refresh(&current, renewed_with) {
            debug!(target: "hv.store", "Session changed during renewal, renewed token dropped");
            return Ok(false);
        }

        let mut set = vec![(ACCESS_TOKEN_SLOT, access_token.expose_secret().to_string())];
        if let Some(refresh) = &rotated_refresh {
            set.push((REFRESH_TOKEN_SLOT, refresh.expose_secret().to_string()));
        }
        self.storage.write(&set)?;

        current.access_token = Some(access_token);
        if let Some(refresh) = rotated_refresh {
            current.refresh_token = Some(refresh);
        }

        debug!(target: "hv.store", rotated = set.len() > 1, "Access token updated");
        Ok(true)
    }

    /// Copy of the current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.read_session().clone()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.read_session().access_token.clone()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.read_session().refresh_token.clone()
    }

    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.read_session().principal.clone()
    }

    /// Whether a session is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.read_session().is_active()
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("session", &*self.read_session())
            .finish_non_exhaustive()
    }
}

fn holds_refresh(session: &Session, refresh_token: &SecretString) -> bool {
    session.is_active()
        && session
            .refresh_token
            .as_ref()
            .is_some_and(|refresh| same_secret(refresh, refresh_token))
}

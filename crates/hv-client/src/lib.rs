//! HealthVault session client library.
//!
//! Owns the credential lifecycle of a signed-in user: attaching the access
//! token to every request, renewing it exactly once per expiry no matter how
//! many requests notice the expiry, persisting the session across reloads,
//! and deciding which views the current principal may reach.
//!
//! # Components
//!
//! - `storage` - session-scoped slot storage (memory, file)
//! - `credential_store` - the single owner of session credentials
//! - `authorizer` - bearer stamping of outgoing requests
//! - `coordinator` - single-flight renewal actor with a waiter list
//! - `publisher` - observable session state
//! - `route_gate` - role-based view reachability
//! - `auth_api` - login / renew / logout calls
//! - `manager` - the facade views talk to
//! - `endpoints` - request builders for the service's REST API

#![warn(clippy::pedantic)]

pub mod auth_api;
pub mod authorizer;
pub mod config;
pub mod coordinator;
pub mod credential_store;
pub mod endpoints;
pub mod errors;
pub mod manager;
pub mod observability;
pub mod publisher;
pub mod route_gate;
pub mod storage;

pub use authorizer::{ApiRequest, ApiResponse};
pub use errors::ClientError;
pub use manager::SessionManager;
pub use publisher::{SessionEvent, SessionReceiver, SessionSnapshot};
pub use route_gate::{RouteDecision, RouteGuard, RouteTable};

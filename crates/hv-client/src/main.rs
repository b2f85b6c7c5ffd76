//! HealthVault session probe
//!
//! Restores (or starts) a session against the configured health-record
//! service, checks that the service is reachable and reports where the
//! signed-in principal would land.

use anyhow::Context;
use hv_client::config::Config;
use hv_client::endpoints;
use hv_client::manager::{session_storage, SessionManager};
use hv_client::observability::init_tracing;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.observability).context("Failed to initialize tracing")?;

    info!(
        api_base_url = %config.api_base_url,
        session_file = ?config.session_file,
        "Starting HealthVault session probe"
    );
    if let Err(e) = config.require_https() {
        warn!(error = %e, "Service is not reached over HTTPS");
    }

    let manager = SessionManager::new(&config, session_storage(&config))
        .context("Failed to create session manager")?;

    if manager.is_authenticated() {
        info!("Restored stored session");
    } else if let (Some(email), Some(password)) = (&config.login_email, &config.login_password) {
        manager
            .login(email, password)
            .await
            .map_err(|e| {
                error!(error = %e, "Sign-in failed");
                e
            })
            .context("Sign-in failed")?;
    } else {
        info!("No stored session and no credentials configured");
    }

    let health = manager.send(endpoints::health()).await;
    match health {
        Ok(response) => info!(status = response.status(), "Service reachable"),
        Err(e) => warn!(error = %e, "Health check failed"),
    }

    match manager.current_principal() {
        Some(principal) => info!(
            user_id = %principal.id,
            role = %principal.role,
            email = %principal.email,
            home = manager.home_route(),
            "Signed in"
        ),
        None => info!(home = manager.home_route(), "Signed out"),
    }
    info!(decision = ?manager.evaluate_route("/"), "Route decision for /");

    Ok(())
}

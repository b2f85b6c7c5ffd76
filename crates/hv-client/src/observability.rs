//! Logging setup for the `hv-client` binary.
//!
//! Component targets are dot-separated (`hv.refresh`, `hv.store`,
//! `common.jwt`, ...). `RUST_LOG` wins when set; otherwise the configured
//! level applies to those targets and everything else logs at `warn`.

use common::config::ObservabilityConfig;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for `config` when `RUST_LOG` is not set.
///
/// A bare level (`debug`) is scoped to this client's targets; anything that
/// already looks like a directive (`hv.refresh=trace,warn`) is used verbatim.
#[must_use]
pub fn default_directive(config: &ObservabilityConfig) -> String {
    let level = config.log_level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("warn,hv={level},hv_client={level},common={level}")
    }
}

/// Build the filter: `RUST_LOG` if set and valid, else [`default_directive`].
#[must_use]
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(config)))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns `TryInitError` if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let json = config.json_logs;
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .try_init()
}

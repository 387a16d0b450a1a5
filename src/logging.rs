//! Tracing subscriber setup.

use std::str::FromStr;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::ObserverError;

/// Modules that are too chatty at `debug`.
const QUIET_MODULES: &str = concat!(
    "h2=info,hyper=info,hyper_util=info,reqwest=info,",
    "sqlx=warn,html5ever=info,selectors=info"
);

/// Expands a bare level (e.g. `debug`) with quiet defaults for noisy
/// dependencies. Directive strings containing `,` or `=` are kept as-is.
#[must_use]
pub fn filter_spec(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains(',') || level.contains('=') {
        level.to_string()
    } else if level.is_empty() {
        format!("info,{QUIET_MODULES}")
    } else {
        format!("{level},{QUIET_MODULES}")
    }
}

/// Installs the global subscriber: compact lines, or JSON lines when
/// `json_format` is set.
///
/// # Errors
///
/// Returns [`ObserverError::Config`] if a global subscriber is already set.
pub fn setup_logging(log_level: &str, json_format: bool) -> Result<(), ObserverError> {
    let spec = filter_spec(log_level);
    let filter = EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json_format {
        registry
            .with(fmt::layer().json().with_target(false).with_current_span(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).compact())
            .try_init()
    };
    installed.map_err(|e| ObserverError::Config(format!("logging: {e}")))?;

    tracing::info!(
        filter = %spec,
        format = if json_format { "json" } else { "compact" },
        "logging initialized"
    );
    Ok(())
}

//! Observability (AU-2, AU-3, AU-12)
//!
//! Application code logs through `tracing` macros and
//! [`security_event!`](crate::security_event); this module only decides
//! where those records go. Output is stdout in one of three formats.
//!
//! # Environment
//!
//! - `RUST_LOG`: filter directive, wins over `LOG_FILTER`
//! - `LOG_FILTER`: fallback filter (default `info,tower_http=info`)
//! - `LOG_FORMAT`: `pretty` (default), `json` or `compact`
//!
//! ```ignore
//! use itemguard::observability::{self, ObservabilityConfig};
//!
//! observability::init(&ObservabilityConfig::from_env())?;
//! ```

mod config;
mod events;
mod providers;

pub use config::{LogFormat, ObservabilityConfig};
pub use events::{SecurityEvent, Severity};

use tracing::info;

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    providers::init_tracing(config)?;

    info!(
        log_format = %config.log_format,
        log_filter = %config.log_filter,
        "Observability initialized"
    );

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("observability config error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),
}

//! Structured logging.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and `tower_http`. JSON output is meant for production log shipping,
//! pretty output for a terminal.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

pub fn init_logging(config: &ObservabilityConfig) {
    let default_directive = format!(
        "admission_guard={level},tower_http={level}",
        level = config.log_level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if let Err(e) = result {
        // A subscriber is already installed (tests, embedding); keep it.
        tracing::debug!(error = %e, "Logging already initialized");
    }
}

//! Configuration validation.
//!
//! Serde handles syntax; this module checks values: addresses parse, rates
//! and timeouts are positive, the guard order is usable. Every violation is
//! reported, not just the first, and validation is a pure function of the
//! config.

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::config::schema::{CacheBackend, GatewayConfig};
use crate::security::chain::check_order;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than zero"));
    }

    let observability = &config.observability;
    if observability.log_level.parse::<LevelFilter>().is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("{:?} is not a valid level", observability.log_level),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", observability.metrics_address),
        ));
    }

    if config.cache.backend == CacheBackend::Redis && config.cache.redis_url.trim().is_empty() {
        errors.push(ValidationError::new("cache.redis_url", "required for the redis backend"));
    }

    let guards = &config.guards;
    if let Err(e) = check_order(&guards.order) {
        errors.push(ValidationError::new("guards.order", e.to_string()));
    }

    let header = guards.header.name.trim();
    if header.is_empty() {
        errors.push(ValidationError::new("guards.header.name", "must not be empty"));
    } else if HeaderName::from_bytes(header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "guards.header.name",
            format!("{:?} is not a valid header name", guards.header.name),
        ));
    }

    if guards.blacklist.set_name.trim().is_empty() {
        errors.push(ValidationError::new("guards.blacklist.set_name", "must not be empty"));
    }
    if guards.blacklist.lookup_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "guards.blacklist.lookup_timeout_ms",
            "must be greater than zero",
        ));
    }

    let rate_limit = &guards.rate_limit;
    if !rate_limit.rate.is_finite() || rate_limit.rate <= 0.0 {
        errors.push(ValidationError::new(
            "guards.rate_limit.rate",
            format!("must be greater than zero, got {}", rate_limit.rate),
        ));
    }
    if rate_limit.burst < 1 {
        errors.push(ValidationError::new("guards.rate_limit.burst", "must be at least 1"));
    }
    if rate_limit.prune_interval_secs == 0 {
        errors.push(ValidationError::new(
            "guards.rate_limit.prune_interval_secs",
            "must be greater than zero",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

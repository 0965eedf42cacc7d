//! Metrics collection and exposition.
//!
//! # Metrics
//! - `admission_decisions_total` (counter): chain outcomes by `outcome`, `reason`
//! - `admission_chain_duration_seconds` (histogram): time spent in the chain
//! - `admission_cache_lookups_total` (counter): blacklist lookups by `result`
//! - `admission_rate_limited_total` (counter): limiter denials by `scope`
//!
//! Recording is a no-op until a recorder is installed, so guards can be used
//! in tests without any setup.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::security::guard::GuardDecision;
use crate::security::rate_limit::LimiterScope;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_decision(decision: &GuardDecision, start: Instant) {
    let (outcome, reason) = match decision {
        GuardDecision::Allow(_) => ("admitted", "none"),
        GuardDecision::Reject { reason, .. } => ("rejected", reason.as_str()),
    };
    ::metrics::counter!(
        "admission_decisions_total",
        "outcome" => outcome,
        "reason" => reason
    )
    .increment(1);
    ::metrics::histogram!("admission_chain_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    ::metrics::counter!("admission_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_rate_limited(scope: LimiterScope) {
    let scope = match scope {
        LimiterScope::Global => "global",
        LimiterScope::PerClient => "per_client",
    };
    ::metrics::counter!("admission_rate_limited_total", "scope" => scope).increment(1);
}

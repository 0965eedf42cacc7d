//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::security::blacklist::DEFAULT_BLACKLIST_SET;
use crate::security::chain::DEFAULT_ORDER;
use crate::security::guard::GuardKind;
use crate::security::headers::DEFAULT_DEVICE_ID_HEADER;
use crate::security::rate_limit::LimiterScope;

/// Root configuration for the admission gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Blacklist cache backend.
    pub cache: CacheConfig,

    /// How the client address is derived.
    pub client_ip: ClientIpConfig,

    /// Guard chain settings.
    pub guards: GuardsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request deadline in seconds, covering the guard chain and the handler.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Which membership cache the blacklist guard talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process sets, seeded from `seed_members`.
    #[default]
    Memory,
    /// A Redis server.
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Redis connection URL, used with the `redis` backend.
    pub redis_url: String,

    /// Addresses preloaded into the blacklist set with the `memory` backend.
    pub seed_members: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            seed_members: Vec::new(),
        }
    }
}

/// Client address resolution.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientIpConfig {
    /// Peers whose `X-Forwarded-For` header is trusted.
    pub trusted_proxies: Vec<IpAddr>,
}

/// Guard chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardsConfig {
    /// Guards to run, in order. Each kind at most once.
    pub order: Vec<GuardKind>,

    pub header: HeaderGuardConfig,

    pub blacklist: BlacklistGuardConfig,

    pub rate_limit: RateLimitConfig,
}

impl Default for GuardsConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER.to_vec(),
            header: HeaderGuardConfig::default(),
            blacklist: BlacklistGuardConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderGuardConfig {
    /// Header that must be present and non-empty.
    pub name: String,
}

impl Default for HeaderGuardConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_ID_HEADER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlacklistGuardConfig {
    /// Name of the cache set holding blocked addresses.
    pub set_name: String,

    /// Upper bound on a single membership lookup, in milliseconds.
    pub lookup_timeout_ms: u64,
}

impl Default for BlacklistGuardConfig {
    fn default() -> Self {
        Self {
            set_name: DEFAULT_BLACKLIST_SET.to_string(),
            lookup_timeout_ms: 200,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Refill rate in requests per second.
    pub rate: f64,

    /// Burst capacity.
    pub burst: u32,

    /// One bucket for the process, or one per client address.
    pub scope: LimiterScope,

    /// How often idle per-client buckets are dropped, in seconds.
    pub prune_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 100.0,
            burst: 50,
            scope: LimiterScope::Global,
            prune_interval_secs: 60,
        }
    }
}

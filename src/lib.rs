//! Request admission pipeline for HTTP services.
//!
//! A configurable chain of guards (path sanitization, required header, IP
//! blacklist, token bucket rate limiting) that admits or rejects each request
//! before it reaches a handler.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::{GuardChain, GuardDecision, ReasonCode};

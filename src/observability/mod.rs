//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Guards and chain produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows into every rejection log line
//! - Metrics are cheap (atomic increments) and safe to record without a recorder

pub mod logging;
pub mod metrics;

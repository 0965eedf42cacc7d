//! Security subsystem: the admission guard chain.
//!
//! # Data Flow
//! ```text
//! Incoming request (default order):
//!     → path.rs       (reject non-canonical paths)          400 PATH_TRAVERSAL
//!     → headers.rs    (require device id header)            400 HEADER_MISSING
//!     → blacklist.rs  (cache membership, fail closed)       403 IP_BLOCKED / 500 CACHE_ERROR
//!     → rate_limit.rs (token bucket)                        429 RATE_LIMITED
//!     → Admitted, context handed to the handler
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple independent checks
//! - Fail closed: reject when a check cannot be completed
//! - Rejection is an ordinary value, never a panic
//! - Misconfiguration is caught when the chain is built, not per request

pub mod blacklist;
pub mod chain;
pub mod clock;
pub mod guard;
pub mod headers;
pub mod path;
pub mod rate_limit;

pub use blacklist::BlacklistGuard;
pub use chain::GuardChain;
pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{
    ContextPatch, Guard, GuardDecision, GuardError, GuardKind, GuardRequest, ReasonCode,
    RequestContext,
};
pub use headers::HeaderGuard;
pub use path::PathGuard;
pub use rate_limit::{KeyedRateLimiter, LimiterScope, RateLimitGuard, TokenBucketLimiter};

//! Ordered composition of guards.
//!
//! # State Machine (per request)
//! ```text
//! Pending ──guard₁ Allow──▶ Pending ──guard₂ Allow──▶ … ──▶ Admitted
//!    │                         │
//!    └──── Reject ─────────────┴──────────────────────────▶ Rejected(reason)
//! ```
//!
//! # Design Decisions
//! - Guards run one after another, never in parallel: later guards may read
//!   context written by earlier ones, and short-circuiting needs an order
//! - The first rejection wins; guards after it are not invoked
//! - Default order is path → header → blacklist → rate_limit. Free local
//!   checks go first so rejected requests never pay for a cache round trip,
//!   and the limiter goes last so rejected requests do not spend tokens

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::MembershipCache;
use crate::config::GuardsConfig;
use crate::observability::metrics;
use crate::security::blacklist::BlacklistGuard;
use crate::security::clock::Clock;
use crate::security::guard::{ContextPatch, Guard, GuardDecision, GuardError, GuardKind, GuardRequest};
use crate::security::headers::HeaderGuard;
use crate::security::path::PathGuard;
use crate::security::rate_limit::RateLimitGuard;

pub const DEFAULT_ORDER: [GuardKind; 4] = [
    GuardKind::Path,
    GuardKind::Header,
    GuardKind::Blacklist,
    GuardKind::RateLimit,
];

pub struct GuardChain {
    guards: Vec<Arc<dyn Guard>>,
    rate_limiter: Option<Arc<RateLimitGuard>>,
}

impl GuardChain {
    /// Chain the given guards in order.
    pub fn new(guards: Vec<Arc<dyn Guard>>) -> Self {
        Self {
            guards,
            rate_limiter: None,
        }
    }

    /// Build the configured guards in the configured order.
    pub fn from_config(
        config: &GuardsConfig,
        cache: Arc<dyn MembershipCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GuardError> {
        check_order(&config.order)?;

        let mut guards: Vec<Arc<dyn Guard>> = Vec::with_capacity(config.order.len());
        let mut rate_limiter = None;

        for kind in &config.order {
            let guard: Arc<dyn Guard> = match kind {
                GuardKind::Path => Arc::new(PathGuard::new()),
                GuardKind::Header => Arc::new(HeaderGuard::new(&config.header.name)?),
                GuardKind::Blacklist => Arc::new(BlacklistGuard::new(
                    cache.clone(),
                    config.blacklist.set_name.clone(),
                    Duration::from_millis(config.blacklist.lookup_timeout_ms),
                )?),
                GuardKind::RateLimit => {
                    let limiter = Arc::new(RateLimitGuard::new(
                        config.rate_limit.rate,
                        config.rate_limit.burst,
                        config.rate_limit.scope,
                        clock.clone(),
                    )?);
                    rate_limiter = Some(limiter.clone());
                    limiter
                }
            };
            guards.push(guard);
        }

        tracing::info!(order = ?config.order, "Guard chain built");
        Ok(Self {
            guards,
            rate_limiter,
        })
    }

    /// Run every guard in order, stopping at the first rejection.
    ///
    /// Each allowed patch is merged into `request.context` before the next
    /// guard runs. The final `Allow` carries all patches combined.
    pub async fn run(&self, request: &mut GuardRequest) -> GuardDecision {
        let start = Instant::now();
        let mut admitted = ContextPatch::empty();

        for guard in &self.guards {
            match guard.check(request).await {
                GuardDecision::Allow(patch) => {
                    request.context.merge(&patch);
                    admitted.extend(patch);
                }
                rejected => {
                    tracing::debug!(
                        guard = %guard.kind(),
                        reason = ?rejected.reason(),
                        client = %request.client_ip,
                        "Guard rejected request"
                    );
                    metrics::record_decision(&rejected, start);
                    return rejected;
                }
            }
        }

        let decision = GuardDecision::Allow(admitted);
        metrics::record_decision(&decision, start);
        decision
    }

    pub fn order(&self) -> Vec<GuardKind> {
        self.guards.iter().map(|g| g.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Drop idle per-client limiter buckets, if the chain has a limiter.
    pub fn prune_idle(&self) -> usize {
        self.rate_limiter
            .as_ref()
            .map(|limiter| limiter.prune_idle())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for GuardChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardChain")
            .field("order", &self.order())
            .finish()
    }
}

/// An order must name at least one guard and no guard twice.
pub fn check_order(order: &[GuardKind]) -> Result<(), GuardError> {
    if order.is_empty() {
        return Err(GuardError::EmptyOrder);
    }
    let mut seen = HashSet::new();
    for kind in order {
        if !seen.insert(*kind) {
            return Err(GuardError::DuplicateGuard(*kind));
        }
    }
    Ok(())
}

//! Token bucket rate limiting.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::security::clock::Clock;
use crate::security::guard::{Guard, GuardDecision, GuardError, GuardKind, GuardRequest, ReasonCode};

/// A token bucket whose level is derived from the last grant, not accumulated.
///
/// `anchor_tokens` is the level at `anchor`; the current level is always
/// `anchor_tokens + elapsed * rate`, capped at capacity. Denied calls leave
/// the anchor alone, so polling frequency never shaves off refill.
#[derive(Debug, Clone)]
struct TokenBucket {
    anchor_tokens: f64,
    anchor: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            anchor_tokens: capacity,
            anchor: now,
        }
    }

    /// Current level. A reading older than the anchor adds nothing and never
    /// rewinds the bucket.
    fn level(&self, now: Instant, capacity: f64, refill_rate: f64) -> f64 {
        let elapsed = now.saturating_duration_since(self.anchor).as_secs_f64();
        (self.anchor_tokens + elapsed * refill_rate).min(capacity)
    }

    /// Re-anchor a full bucket so idle time past capacity is not banked.
    fn refill(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> f64 {
        let level = self.level(now, capacity, refill_rate);
        if level >= capacity {
            self.anchor_tokens = capacity;
            self.anchor = self.anchor.max(now);
        }
        level
    }

    fn try_acquire(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let level = self.refill(now, capacity, refill_rate);

        if level >= 1.0 {
            self.anchor_tokens = level - 1.0;
            self.anchor = self.anchor.max(now);
            true
        } else {
            false
        }
    }
}

/// Validated limiter parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitParams {
    rate: f64,
    burst: u32,
}

impl RateLimitParams {
    pub fn new(rate: f64, burst: u32) -> Result<Self, GuardError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(GuardError::InvalidRate(rate));
        }
        if burst < 1 {
            return Err(GuardError::InvalidBurst(burst));
        }
        Ok(Self { rate, burst })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    fn capacity(&self) -> f64 {
        self.burst as f64
    }
}

/// A single shared token bucket.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    params: RateLimitParams,
    bucket: Mutex<TokenBucket>,
    clock: Arc<dyn Clock>,
}

impl TokenBucketLimiter {
    /// Create a limiter that starts with a full bucket.
    pub fn new(rate: f64, burst: u32, clock: Arc<dyn Clock>) -> Result<Self, GuardError> {
        let params = RateLimitParams::new(rate, burst)?;
        let bucket = TokenBucket::new(params.capacity(), clock.now());
        Ok(Self {
            params,
            bucket: Mutex::new(bucket),
            clock,
        })
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.try_acquire(now, self.params.capacity(), self.params.rate())
    }

    /// Whole tokens currently available, after refilling.
    pub fn available(&self) -> u32 {
        let now = self.clock.now();
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.refill(now, self.params.capacity(), self.params.rate()).floor() as u32
    }

    pub fn params(&self) -> RateLimitParams {
        self.params
    }
}

/// One token bucket per key.
#[derive(Debug)]
pub struct KeyedRateLimiter {
    params: RateLimitParams,
    buckets: DashMap<String, TokenBucket>,
    clock: Arc<dyn Clock>,
}

impl KeyedRateLimiter {
    pub fn new(rate: f64, burst: u32, clock: Arc<dyn Clock>) -> Result<Self, GuardError> {
        Ok(Self {
            params: RateLimitParams::new(rate, burst)?,
            buckets: DashMap::new(),
            clock,
        })
    }

    pub fn allow(&self, key: &str) -> bool {
        let now = self.clock.now();
        let capacity = self.params.capacity();
        // The entry guard holds the shard lock for the whole refill-then-consume step.
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(capacity, now));
        bucket.try_acquire(now, capacity, self.params.rate())
    }

    pub fn available(&self, key: &str) -> u32 {
        let now = self.clock.now();
        match self.buckets.get_mut(key) {
            Some(mut bucket) => bucket
                .refill(now, self.params.capacity(), self.params.rate())
                .floor() as u32,
            None => self.params.burst(),
        }
    }

    /// Drop buckets that have refilled to capacity; they are indistinguishable
    /// from a fresh bucket. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let now = self.clock.now();
        let capacity = self.params.capacity();
        let rate = self.params.rate();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            bucket.refill(now, capacity, rate) < capacity
        });
        before.saturating_sub(self.buckets.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    pub fn params(&self) -> RateLimitParams {
        self.params
    }
}

/// Which requests share a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterScope {
    /// One bucket for the whole process.
    #[default]
    Global,
    /// One bucket per client address.
    PerClient,
}

#[derive(Debug)]
enum Limiter {
    Global(TokenBucketLimiter),
    PerClient(KeyedRateLimiter),
}

/// Guard rejecting with `RATE_LIMITED` once the bucket is empty.
#[derive(Debug)]
pub struct RateLimitGuard {
    limiter: Limiter,
}

impl RateLimitGuard {
    pub fn new(
        rate: f64,
        burst: u32,
        scope: LimiterScope,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GuardError> {
        let limiter = match scope {
            LimiterScope::Global => Limiter::Global(TokenBucketLimiter::new(rate, burst, clock)?),
            LimiterScope::PerClient => {
                Limiter::PerClient(KeyedRateLimiter::new(rate, burst, clock)?)
            }
        };
        Ok(Self { limiter })
    }

    pub fn scope(&self) -> LimiterScope {
        match self.limiter {
            Limiter::Global(_) => LimiterScope::Global,
            Limiter::PerClient(_) => LimiterScope::PerClient,
        }
    }

    pub fn check_client(&self, client_ip: IpAddr) -> GuardDecision {
        let allowed = match &self.limiter {
            Limiter::Global(limiter) => limiter.allow(),
            Limiter::PerClient(limiter) => limiter.allow(&client_ip.to_string()),
        };

        if allowed {
            GuardDecision::allow()
        } else {
            tracing::warn!(client = %client_ip, scope = ?self.scope(), "Rate limit exceeded");
            metrics::record_rate_limited(self.scope());
            GuardDecision::reject(ReasonCode::RateLimited)
        }
    }

    /// Prune idle per-client buckets; a no-op for the global scope.
    pub fn prune_idle(&self) -> usize {
        match &self.limiter {
            Limiter::Global(_) => 0,
            Limiter::PerClient(limiter) => limiter.prune_idle(),
        }
    }
}

#[async_trait]
impl Guard for RateLimitGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::RateLimit
    }

    async fn check(&self, request: &GuardRequest) -> GuardDecision {
        self.check_client(request.client_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;
    use std::time::Duration;

    fn limiter(rate: f64, burst: u32) -> (TokenBucketLimiter, ManualClock) {
        let clock = ManualClock::default();
        let limiter = TokenBucketLimiter::new(rate, burst, Arc::new(clock.clone())).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_burst_then_deny() {
        let (limiter, _clock) = limiter(1.0, 5);
        for i in 0..5 {
            assert!(limiter.allow(), "call {} should be allowed", i);
        }
        assert!(!limiter.allow(), "call past burst should be denied");
    }

    #[test]
    fn test_refill_after_idle() {
        let (limiter, clock) = limiter(2.0, 10);
        while limiter.allow() {}
        assert_eq!(limiter.available(), 0);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(limiter.available(), 3);

        // Capped at burst no matter how long it sat.
        clock.advance(Duration::from_secs(3600));
        assert_eq!(limiter.available(), 10);
    }

    #[test]
    fn test_partial_tokens_floor() {
        let (limiter, clock) = limiter(1.0, 3);
        while limiter.allow() {}

        clock.advance(Duration::from_millis(999));
        assert_eq!(limiter.available(), 0);
        assert!(!limiter.allow());

        clock.advance(Duration::from_millis(1));
        assert!(limiter.allow());
    }

    #[test]
    fn test_frequent_polling_keeps_full_rate() {
        let (limiter, clock) = limiter(1.0, 1);
        assert!(limiter.allow());

        let mut granted_at = None;
        for step in 1..=10 {
            clock.advance(Duration::from_millis(100));
            if limiter.allow() {
                granted_at = Some(step);
                break;
            }
        }
        assert_eq!(granted_at, Some(10));
    }

    #[test]
    fn test_many_small_steps_match_one_large_step() {
        let (stepped, stepped_clock) = limiter(3.0, 50);
        let (jumped, jumped_clock) = limiter(3.0, 50);
        while stepped.allow() {}
        while jumped.allow() {}

        for _ in 0..1000 {
            stepped_clock.advance(Duration::from_millis(7));
            let _ = stepped.available();
        }
        jumped_clock.advance(Duration::from_millis(7000));

        assert_eq!(stepped.available(), 21);
        assert_eq!(jumped.available(), 21);
    }

    #[test]
    fn test_clock_going_backwards_adds_nothing() {
        let start = std::time::Instant::now() + Duration::from_secs(100);
        let clock = ManualClock::new(start);
        let limiter = TokenBucketLimiter::new(1.0, 1, Arc::new(clock.clone())).unwrap();
        assert!(limiter.allow());

        clock.set(start - Duration::from_secs(50));
        assert!(!limiter.allow());

        clock.set(start + Duration::from_secs(1));
        assert!(limiter.allow());
    }

    #[test]
    fn test_invalid_params() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        assert_eq!(
            TokenBucketLimiter::new(0.0, 1, clock.clone()).unwrap_err(),
            GuardError::InvalidRate(0.0)
        );
        assert_eq!(
            TokenBucketLimiter::new(-1.0, 1, clock.clone()).unwrap_err(),
            GuardError::InvalidRate(-1.0)
        );
        assert!(matches!(
            TokenBucketLimiter::new(f64::NAN, 1, clock.clone()),
            Err(GuardError::InvalidRate(_))
        ));
        assert_eq!(
            TokenBucketLimiter::new(1.0, 0, clock).unwrap_err(),
            GuardError::InvalidBurst(0)
        );
    }

    #[test]
    fn test_concurrent_callers_never_overdraw() {
        let clock = ManualClock::default();
        let limiter = Arc::new(TokenBucketLimiter::new(1.0, 100, Arc::new(clock)).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..50).filter(|_| limiter.allow()).count())
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 100);
        assert_eq!(limiter.available(), 0);
    }

    #[test]
    fn test_keyed_buckets_are_independent() {
        let clock = ManualClock::default();
        let limiter = KeyedRateLimiter::new(1.0, 2, Arc::new(clock.clone())).unwrap();

        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
        assert_eq!(limiter.available("10.0.0.3"), 2);
    }

    #[test]
    fn test_prune_idle_drops_full_buckets() {
        let clock = ManualClock::default();
        let limiter = KeyedRateLimiter::new(1.0, 2, Arc::new(clock.clone())).unwrap();

        limiter.allow("a");
        limiter.allow("b");
        limiter.allow("b");
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance(Duration::from_secs(1));
        // "a" is full again, "b" still owes one token.
        assert_eq!(limiter.prune_idle(), 1);
        assert_eq!(limiter.tracked_keys(), 1);

        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.prune_idle(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_guard_rejects_when_empty() {
        let clock = ManualClock::default();
        let guard = RateLimitGuard::new(1.0, 1, LimiterScope::Global, Arc::new(clock)).unwrap();
        let request = GuardRequest::new(
            "127.0.0.1".parse().unwrap(),
            "/",
            axum::http::HeaderMap::new(),
        );

        assert!(guard.check(&request).await.is_allow());
        assert_eq!(
            guard.check(&request).await.reason(),
            Some(ReasonCode::RateLimited)
        );
    }

    #[tokio::test]
    async fn test_per_client_guard_keys_by_ip() {
        let clock = ManualClock::default();
        let guard = RateLimitGuard::new(1.0, 1, LimiterScope::PerClient, Arc::new(clock)).unwrap();
        let first = GuardRequest::new("10.0.0.1".parse().unwrap(), "/", Default::default());
        let second = GuardRequest::new("10.0.0.2".parse().unwrap(), "/", Default::default());

        assert!(guard.check(&first).await.is_allow());
        assert!(!guard.check(&first).await.is_allow());
        assert!(guard.check(&second).await.is_allow());
    }
}

//! Cache-backed client address blacklist.
//!
//! One membership query per request, bounded by a timeout. Lookup failure
//! rejects with `CACHE_ERROR`: a request that cannot be cleared is not
//! admitted. Switching this to fail-open is a policy change, not a fix.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::MembershipCache;
use crate::observability::metrics;
use crate::security::guard::{Guard, GuardDecision, GuardError, GuardKind, GuardRequest, ReasonCode};

pub const DEFAULT_BLACKLIST_SET: &str = "blacklist_ip";

pub struct BlacklistGuard {
    cache: Arc<dyn MembershipCache>,
    set_name: String,
    lookup_timeout: Duration,
}

impl BlacklistGuard {
    pub fn new(
        cache: Arc<dyn MembershipCache>,
        set_name: impl Into<String>,
        lookup_timeout: Duration,
    ) -> Result<Self, GuardError> {
        let set_name = set_name.into();
        if set_name.trim().is_empty() {
            return Err(GuardError::EmptySetName);
        }
        if lookup_timeout.is_zero() {
            return Err(GuardError::ZeroTimeout);
        }
        Ok(Self {
            cache,
            set_name,
            lookup_timeout,
        })
    }

    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub async fn check_key(&self, client_key: &str) -> GuardDecision {
        let lookup = self.cache.is_member(&self.set_name, client_key);

        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(true)) => {
                metrics::record_cache_lookup("hit");
                tracing::warn!(client = %client_key, set = %self.set_name, "Blacklisted client rejected");
                GuardDecision::reject(ReasonCode::IpBlocked)
            }
            Ok(Ok(false)) => {
                metrics::record_cache_lookup("miss");
                GuardDecision::allow()
            }
            Ok(Err(e)) => {
                metrics::record_cache_lookup("error");
                tracing::error!(client = %client_key, error = %e, "Blacklist lookup failed");
                GuardDecision::reject(ReasonCode::CacheError)
            }
            Err(_) => {
                metrics::record_cache_lookup("timeout");
                tracing::error!(
                    client = %client_key,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Blacklist lookup timed out"
                );
                GuardDecision::reject(ReasonCode::CacheError)
            }
        }
    }
}

impl std::fmt::Debug for BlacklistGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlacklistGuard")
            .field("set_name", &self.set_name)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Guard for BlacklistGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Blacklist
    }

    async fn check(&self, request: &GuardRequest) -> GuardDecision {
        self.check_key(&request.client_ip.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FailingCache;

    #[async_trait]
    impl MembershipCache for FailingCache {
        async fn is_member(&self, _set: &str, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    /// Never answers; records whether the pending lookup was dropped.
    struct HangingCache {
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MembershipCache for HangingCache {
        async fn is_member(&self, _set: &str, _key: &str) -> Result<bool, CacheError> {
            let _flag = DropFlag(self.dropped.clone());
            std::future::pending::<()>().await;
            Ok(false)
        }
    }

    fn guard(cache: Arc<dyn MembershipCache>) -> BlacklistGuard {
        BlacklistGuard::new(cache, DEFAULT_BLACKLIST_SET, Duration::from_millis(50)).unwrap()
    }

    #[tokio::test]
    async fn test_member_rejected() {
        let cache = MemoryCache::seeded(DEFAULT_BLACKLIST_SET, ["203.0.113.9"]);
        let decision = guard(Arc::new(cache)).check_key("203.0.113.9").await;
        assert_eq!(decision, GuardDecision::reject(ReasonCode::IpBlocked));
    }

    #[tokio::test]
    async fn test_non_member_allowed() {
        let cache = MemoryCache::seeded(DEFAULT_BLACKLIST_SET, ["203.0.113.9"]);
        assert!(guard(Arc::new(cache)).check_key("198.51.100.1").await.is_allow());
    }

    #[tokio::test]
    async fn test_lookup_error_fails_closed() {
        let decision = guard(Arc::new(FailingCache)).check_key("198.51.100.1").await;
        assert_eq!(decision, GuardDecision::reject(ReasonCode::CacheError));
    }

    #[tokio::test]
    async fn test_timeout_fails_closed_and_cancels_lookup() {
        let dropped = Arc::new(AtomicBool::new(false));
        let cache = HangingCache {
            dropped: dropped.clone(),
        };
        let decision = guard(Arc::new(cache)).check_key("198.51.100.1").await;

        assert_eq!(decision.reason(), Some(ReasonCode::CacheError));
        assert!(dropped.load(Ordering::SeqCst), "timed out lookup should be dropped");
    }

    #[test]
    fn test_construction_checks() {
        let cache: Arc<dyn MembershipCache> = Arc::new(MemoryCache::new());
        assert_eq!(
            BlacklistGuard::new(cache.clone(), "", Duration::from_millis(10)).unwrap_err(),
            GuardError::EmptySetName
        );
        assert_eq!(
            BlacklistGuard::new(cache, "set", Duration::ZERO).unwrap_err(),
            GuardError::ZeroTimeout
        );
    }
}

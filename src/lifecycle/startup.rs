//! Startup orchestration.
//!
//! Config is loaded and validated first, then the cache client is
//! connected, then the guard chain is built. Any failure here is fatal: the
//! process exits before accepting traffic.

use std::sync::Arc;

use crate::cache::{CacheError, MembershipCache, MemoryCache, RedisCache};
use crate::config::{CacheBackend, GatewayConfig};

/// Construct the membership cache the blacklist guard will query.
pub async fn build_cache(config: &GatewayConfig) -> Result<Arc<dyn MembershipCache>, CacheError> {
    match config.cache.backend {
        CacheBackend::Memory => {
            let set = &config.guards.blacklist.set_name;
            let cache = MemoryCache::seeded(set, config.cache.seed_members.iter().cloned());
            tracing::info!(set = %set, members = cache.len(set), "Using in-memory blacklist");
            Ok(Arc::new(cache))
        }
        CacheBackend::Redis => Ok(Arc::new(RedisCache::connect(&config.cache.redis_url).await?)),
    }
}

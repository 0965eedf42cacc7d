//! Set-membership cache collaborators.
//!
//! # Data Flow
//! ```text
//! BlacklistGuard
//!     → MembershipCache::is_member(set, key)
//!         → redis.rs  (SISMEMBER over a connection manager)
//!         → memory.rs (in-process sets, development and tests)
//! ```
//!
//! # Design Decisions
//! - The guard owns the timeout; backends just answer or fail
//! - Backends never decide policy: an error is reported, not turned into a verdict

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

/// Failure talking to the membership cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Answers "is `key` a member of `set`?".
#[async_trait]
pub trait MembershipCache: Send + Sync {
    async fn is_member(&self, set: &str, key: &str) -> Result<bool, CacheError>;
}

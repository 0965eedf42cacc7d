//! Redis-backed membership lookups.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::cache::{CacheError, MembershipCache};

/// `SISMEMBER` against a Redis server.
///
/// The connection manager reconnects on its own; a failed command surfaces as
/// a [`CacheError`] and the next call tries again.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(url = %url, "Connected to Redis");
        Ok(Self { conn })
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

#[async_trait]
impl MembershipCache for RedisCache {
    async fn is_member(&self, set: &str, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let found: bool = conn.sismember(set, key).await?;
        Ok(found)
    }
}

//! In-process membership sets.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::{CacheError, MembershipCache};

/// A thread-safe map of set name to members.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    sets: Arc<DashMap<String, HashSet<String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache with `members` already present in `set`.
    pub fn seeded<I, S>(set: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cache = Self::new();
        for member in members {
            cache.add(set, member);
        }
        cache
    }

    pub fn add(&self, set: &str, member: impl Into<String>) {
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.into());
    }

    pub fn remove(&self, set: &str, member: &str) -> bool {
        self.sets
            .get_mut(set)
            .map(|mut members| members.remove(member))
            .unwrap_or(false)
    }

    pub fn len(&self, set: &str) -> usize {
        self.sets.get(set).map(|members| members.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MembershipCache for MemoryCache {
    async fn is_member(&self, set: &str, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .sets
            .get(set)
            .map(|members| members.contains(key))
            .unwrap_or(false))
    }
}

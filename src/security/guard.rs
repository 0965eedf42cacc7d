//! Guard abstraction shared by every admission check.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Context key under which the header guard stores the device identifier.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Stable, machine-checkable rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    HeaderMissing,
    IpBlocked,
    CacheError,
    PathTraversal,
    RateLimited,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::HeaderMissing => "HEADER_MISSING",
            ReasonCode::IpBlocked => "IP_BLOCKED",
            ReasonCode::CacheError => "CACHE_ERROR",
            ReasonCode::PathTraversal => "PATH_TRAVERSAL",
            ReasonCode::RateLimited => "RATE_LIMITED",
        }
    }

    /// The HTTP status each reason is surfaced with.
    pub fn status(&self) -> StatusCode {
        match self {
            ReasonCode::HeaderMissing | ReasonCode::PathTraversal => StatusCode::BAD_REQUEST,
            ReasonCode::IpBlocked => StatusCode::FORBIDDEN,
            ReasonCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ReasonCode::CacheError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human readable message sent alongside the code.
    pub fn message(&self) -> &'static str {
        match self {
            ReasonCode::HeaderMissing => "Required header is missing",
            ReasonCode::IpBlocked => "Client address is blocked",
            ReasonCode::CacheError => "Unable to verify client address",
            ReasonCode::PathTraversal => "Request path is not canonical",
            ReasonCode::RateLimited => "Rate limit exceeded",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values a passing guard wants merged into the request context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPatch {
    entries: Vec<(String, String)>,
}

impl ContextPatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append another patch; later entries win on key collisions.
    pub fn extend(&mut self, other: ContextPatch) {
        self.entries.extend(other.entries);
    }
}

/// Request-scoped key/value bag shared by guards and the final handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequestContext {
    values: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn merge(&mut self, patch: &ContextPatch) {
        for (k, v) in patch.iter() {
            self.values.insert(k.to_string(), v.to_string());
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.get(DEVICE_ID_KEY)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The parts of an inbound request the pipeline looks at.
#[derive(Debug, Clone)]
pub struct GuardRequest {
    pub client_ip: IpAddr,
    pub path: String,
    pub headers: HeaderMap,
    pub context: RequestContext,
}

impl GuardRequest {
    pub fn new(client_ip: IpAddr, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            client_ip,
            path: path.into(),
            headers,
            context: RequestContext::default(),
        }
    }
}

/// Outcome of a single guard, or of the whole chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow(ContextPatch),
    Reject { reason: ReasonCode, status: StatusCode },
}

impl GuardDecision {
    pub fn allow() -> Self {
        GuardDecision::Allow(ContextPatch::empty())
    }

    pub fn reject(reason: ReasonCode) -> Self {
        GuardDecision::Reject {
            reason,
            status: reason.status(),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, GuardDecision::Allow(_))
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            GuardDecision::Allow(_) => None,
            GuardDecision::Reject { reason, .. } => Some(*reason),
        }
    }
}

/// The guard variants a chain can be assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    Path,
    Header,
    Blacklist,
    RateLimit,
}

impl GuardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Path => "path",
            GuardKind::Header => "header",
            GuardKind::Blacklist => "blacklist",
            GuardKind::RateLimit => "rate_limit",
        }
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction-time misconfiguration of a guard or chain.
#[derive(Debug, Error, PartialEq)]
pub enum GuardError {
    #[error("rate must be a finite number greater than zero, got {0}")]
    InvalidRate(f64),

    #[error("burst must be at least 1, got {0}")]
    InvalidBurst(u32),

    #[error("required header name must not be empty")]
    EmptyHeaderName,

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("blacklist set name must not be empty")]
    EmptySetName,

    #[error("lookup timeout must be greater than zero")]
    ZeroTimeout,

    #[error("guard order must list at least one guard")]
    EmptyOrder,

    #[error("guard {0} appears more than once in the order")]
    DuplicateGuard(GuardKind),
}

/// A single admission check.
#[async_trait]
pub trait Guard: Send + Sync {
    fn kind(&self) -> GuardKind;

    async fn check(&self, request: &GuardRequest) -> GuardDecision;
}

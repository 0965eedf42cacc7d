//! Admission middleware.
//! Runs the guard chain once per request before any handler.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::cache::MembershipCache;
use crate::config::GatewayConfig;
use crate::http::request::{request_id, resolve_client_ip, ClientIp};
use crate::http::response::{rejection_response, retry_after_secs};
use crate::security::chain::GuardChain;
use crate::security::clock::Clock;
use crate::security::guard::{GuardDecision, GuardError, GuardRequest};

/// Everything the middleware needs for one configuration generation.
#[derive(Debug)]
pub struct Admission {
    pub chain: GuardChain,
    pub trusted_proxies: Vec<IpAddr>,
    pub retry_after_secs: u64,
}

impl Admission {
    pub fn new(chain: GuardChain) -> Self {
        Self {
            chain,
            trusted_proxies: Vec::new(),
            retry_after_secs: 1,
        }
    }

    pub fn from_config(
        config: &GatewayConfig,
        cache: Arc<dyn MembershipCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GuardError> {
        Ok(Self {
            chain: GuardChain::from_config(&config.guards, cache, clock)?,
            trusted_proxies: config.client_ip.trusted_proxies.clone(),
            retry_after_secs: retry_after_secs(config.guards.rate_limit.rate),
        })
    }
}

/// Shared, hot-swappable admission state.
#[derive(Clone)]
pub struct AdmissionState {
    current: Arc<ArcSwap<Admission>>,
}

impl AdmissionState {
    pub fn new(admission: Admission) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(admission)),
        }
    }

    pub fn load(&self) -> Arc<Admission> {
        self.current.load_full()
    }

    /// Replace the admission state; in-flight requests finish on the old one.
    pub fn replace(&self, admission: Admission) {
        self.current.store(Arc::new(admission));
    }
}

pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let admission = state.load();
    let client_ip = resolve_client_ip(peer.ip(), req.headers(), &admission.trusted_proxies);

    let mut guard_request = GuardRequest::new(client_ip, req.uri().path(), req.headers().clone());

    match admission.chain.run(&mut guard_request).await {
        GuardDecision::Allow(_) => {
            req.extensions_mut().insert(guard_request.context);
            req.extensions_mut().insert(ClientIp(client_ip));
            next.run(req).await
        }
        GuardDecision::Reject { reason, status } => {
            let request_id = request_id(req.headers());
            tracing::warn!(
                request_id = %request_id,
                client = %client_ip,
                path = %req.uri().path(),
                reason = %reason,
                status = status.as_u16(),
                "Request rejected"
            );
            rejection_response(reason, status, request_id, admission.retry_after_secs)
        }
    }
}

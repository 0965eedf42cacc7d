//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_guard::cache::{CacheError, MembershipCache, MemoryCache};
use admission_guard::config::GatewayConfig;
use admission_guard::http::HttpServer;
use admission_guard::lifecycle::Shutdown;
use admission_guard::security::ManualClock;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const CLIENT: &str = "198.51.100.20:40000";
pub const BLOCKED: &str = "203.0.113.66:40000";

/// Default config bound to an ephemeral local port.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config
}

pub fn blocked_cache(config: &GatewayConfig) -> Arc<dyn MembershipCache> {
    Arc::new(MemoryCache::seeded(
        &config.guards.blacklist.set_name,
        ["203.0.113.66"],
    ))
}

/// Router over a frozen clock, so only burst capacity matters.
pub fn router(config: GatewayConfig, cache: Arc<dyn MembershipCache>) -> Router {
    HttpServer::new(config, cache, Arc::new(ManualClock::default()))
        .expect("valid test config")
        .router()
}

pub fn request(path: &str, peer: &str, device_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(id) = device_id {
        builder = builder.header("x-device-id", id);
    }
    let mut req = builder.body(Body::empty()).unwrap();
    let peer: SocketAddr = peer.parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, serde_json::Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, headers, json)
}

/// Start a real server on an ephemeral port.
pub async fn spawn_server(
    config: GatewayConfig,
    cache: Arc<dyn MembershipCache>,
) -> (SocketAddr, Shutdown, mpsc::UnboundedSender<GatewayConfig>) {
    let server = HttpServer::new(config, cache, Arc::new(ManualClock::default())).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (update_tx, config_updates) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, shutdown, update_tx)
}

/// Cache that always errors.
pub struct UnreachableCache;

#[async_trait]
impl MembershipCache for UnreachableCache {
    async fn is_member(&self, _set: &str, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

/// Cache that answers far slower than any lookup timeout used in tests.
pub struct SlowCache;

#[async_trait]
impl MembershipCache for SlowCache {
    async fn is_member(&self, _set: &str, _key: &str) -> Result<bool, CacheError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(false)
    }
}

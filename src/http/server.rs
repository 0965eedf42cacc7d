//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the admission middleware and the echo handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Swap in a freshly built guard chain when the config changes
//! - Prune idle per-client limiter buckets
//! - Drain on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Request},
    middleware,
    routing::any,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::MembershipCache;
use crate::config::validation::validate_config;
use crate::config::{ConfigError, GatewayConfig};
use crate::http::middleware::{admission_middleware, Admission, AdmissionState};
use crate::http::request::{request_id, ClientIp, MakeRequestUuid};
use crate::security::clock::Clock;
use crate::lifecycle::ShutdownSignal;
use crate::security::guard::{GuardError, RequestContext};

/// Why a server could not be built from a config.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Guard(#[from] GuardError),
}

/// HTTP server fronted by the guard chain.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AdmissionState,
    cache: Arc<dyn MembershipCache>,
    clock: Arc<dyn Clock>,
}

impl HttpServer {
    /// Build the guard chain from `config` and the router around it.
    ///
    /// The config is validated here as well as in the loader, so a config
    /// built in code gets the same checks and a misconfigured server never
    /// starts.
    pub fn new(
        config: GatewayConfig,
        cache: Arc<dyn MembershipCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let admission = Admission::from_config(&config, cache.clone(), clock.clone())?;
        let state = AdmissionState::new(admission);
        let router = Self::build_router(&config, state.clone());

        Ok(Self {
            router,
            config,
            state,
            cache,
            clock,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AdmissionState) -> Router {
        Router::new()
            .route("/", any(echo_handler))
            .route("/{*path}", any(echo_handler))
            .fallback(echo_handler)
            .layer(middleware::from_fn_with_state(state, admission_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn admission(&self) -> AdmissionState {
        self.state.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Validated configs arriving on `config_updates` rebuild the guard chain;
    /// limiter state starts fresh with each rebuild. Cache backend changes
    /// need a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            order = ?self.state.load().chain.order(),
            "HTTP server starting"
        );

        let state = self.state.clone();
        let cache = self.cache.clone();
        let clock = self.clock.clone();
        let prune_every = Duration::from_secs(self.config.guards.rate_limit.prune_interval_secs);
        let mut maintenance_shutdown = shutdown.resubscribe();

        tokio::spawn(async move {
            let mut prune = tokio::time::interval(prune_every);
            let mut updates_open = true;
            loop {
                tokio::select! {
                    _ = maintenance_shutdown.wait() => break,
                    _ = prune.tick() => {
                        let removed = state.load().chain.prune_idle();
                        if removed > 0 {
                            tracing::debug!(removed, "Pruned idle rate limit buckets");
                        }
                    }
                    update = config_updates.recv(), if updates_open => match update {
                        Some(new_config) => {
                            if let Err(errors) = validate_config(&new_config) {
                                let e = ConfigError::Validation(errors);
                                tracing::error!(error = %e, "Rejected config reload, keeping current guard chain");
                                continue;
                            }
                            match Admission::from_config(&new_config, cache.clone(), clock.clone()) {
                                Ok(admission) => {
                                    tracing::info!(order = ?admission.chain.order(), "Guard chain reloaded");
                                    state.replace(admission);
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, "Rejected config reload, keeping current guard chain");
                                }
                            }
                        }
                        None => updates_open = false,
                    },
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// What the echo handler reports about an admitted request.
#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub request_id: String,
    pub client_ip: String,
    pub path: String,
    pub device_id: Option<String>,
    pub context: RequestContext,
}

/// Stand-in for the downstream business handler: reports what admission
/// attached to the request.
async fn echo_handler(
    Extension(context): Extension<RequestContext>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    request: Request,
) -> Json<EchoResponse> {
    Json(EchoResponse {
        request_id: request_id(request.headers()),
        client_ip: client_ip.to_string(),
        path: request.uri().path().to_string(),
        device_id: context.device_id().map(str::to_string),
        context,
    })
}

//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all dispatch handler
//! - Wire up middleware (tracing, front-side request timeout)
//! - Serve with graceful shutdown bounded by the configured grace period
//! - Apply configuration reloads to the registry and client pool
//! - Spawn the admin surface on its own bind address

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderName, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::Authenticator;
use crate::config::{load_config, ProxyConfig};
use crate::lifecycle::signals::{Signal, Signals};
use crate::lifecycle::Shutdown;
use crate::proxy::dispatch::dispatch;
use crate::resilience::{CircuitSettings, CircuitTracker};
use crate::targets::TargetRegistry;
use crate::upstream::ClientPool;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TargetRegistry>,
    pub pool: Arc<ClientPool>,
    pub authenticator: Arc<Authenticator>,
    pub circuits: Arc<CircuitTracker>,
    /// Front-side credential headers stripped before forwarding.
    pub stripped_headers: Arc<Vec<HeaderName>>,
    pub forwarded_proto: Arc<str>,
    pub request_timeout: Duration,
    pub max_replay_body_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &ProxyConfig) -> Self {
        let authenticator = Arc::new(Authenticator::from_config(&config.auth));
        let stripped_headers = Arc::new(authenticator.stripped_headers());
        Self {
            registry: Arc::new(TargetRegistry::from_config(&config.targets)),
            pool: Arc::new(ClientPool::new()),
            authenticator,
            circuits: Arc::new(CircuitTracker::new(CircuitSettings::default())),
            stripped_headers,
            forwarded_proto: Arc::from(config.server.forwarded_proto.as_str()),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            max_replay_body_bytes: config.server.max_replay_body_bytes,
        }
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(config: &ProxyConfig, state: AppState) -> Router {
    Router::new()
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
}

/// Swap in a freshly loaded target set and drop stale clients.
pub fn apply_reload(state: &AppState, config: &ProxyConfig) {
    let targets = TargetRegistry::build_targets(&config.targets);
    let invalidated = state.registry.reload(targets);
    for id in &invalidated {
        state.pool.invalidate(id);
    }
    tracing::info!(
        targets = state.registry.len(),
        invalidated = invalidated.len(),
        "Applied target reload"
    );
}

/// HTTP server for the Redfish proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    state: AppState,
    config_path: Option<PathBuf>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let state = AppState::from_config(&config);
        let router = build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
            config_path: None,
        }
    }

    /// Remember the config file path so SIGHUP can reload targets from it.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Get a reference to the shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            targets = self.state.registry.len(),
            "HTTP server starting"
        );

        // Admin surface on its own bind address.
        if self.config.admin.enabled {
            let admin_config = self.config.admin.clone();
            let admin_state = self.state.clone();
            tokio::spawn(async move {
                if let Err(e) = crate::admin::serve(admin_config, admin_state).await {
                    tracing::error!(error = %e, "Admin server failed");
                }
            });
        }

        let shutdown = Arc::new(Shutdown::new());

        // Signal handling: SIGTERM/SIGINT stop the server, SIGHUP reloads
        // the target set from disk.
        {
            let shutdown = shutdown.clone();
            let state = self.state.clone();
            let config_path = self.config_path.clone();
            tokio::spawn(async move {
                let mut signals = match Signals::new() {
                    Ok(signals) => signals,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };
                loop {
                    match signals.next().await {
                        Signal::Shutdown => {
                            tracing::info!("Shutdown signal received");
                            shutdown.trigger();
                            break;
                        }
                        Signal::Reload => match &config_path {
                            Some(path) => match load_config(path) {
                                Ok(new_config) => apply_reload(&state, &new_config),
                                Err(e) => {
                                    tracing::error!(error = %e, "Reload rejected, keeping running config");
                                }
                            },
                            None => {
                                tracing::warn!("Reload signal received but no config path is known");
                            }
                        },
                    }
                }
            });
        }

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        let graceful = {
            let mut rx = shutdown.subscribe();
            async move {
                let _ = rx.recv().await;
            }
        };

        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
        let mut rx = shutdown.subscribe();
        let deadline = async move {
            let _ = rx.recv().await;
            tokio::time::sleep(grace).await;
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(graceful);
        tokio::select! {
            result = server => result?,
            _ = deadline => {
                tracing::warn!(
                    grace_secs = self.config.server.shutdown_grace_secs,
                    "Shutdown grace period expired, dropping in-flight requests"
                );
            }
        }

        self.state.pool.shutdown();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler: hands every request to the dispatch state machine.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> impl IntoResponse {
    let response: Response = dispatch(state, peer, request).await;
    response
}

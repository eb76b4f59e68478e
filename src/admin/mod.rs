//! Admin/introspection surface.
//!
//! Served on its own bind address, bearer-token protected, and disabled by
//! default. Exposes registry and circuit snapshots; credential material is
//! never part of any response.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::config::AdminConfig;
use crate::proxy::AppState;

/// State for admin handlers: the shared app state plus the bearer key.
#[derive(Clone)]
pub struct AdminState {
    pub app: AppState,
    pub api_key: Arc<str>,
}

/// Serve the admin endpoints until the process exits.
pub async fn serve(config: AdminConfig, app: AppState) -> Result<(), std::io::Error> {
    let state = AdminState {
        app,
        api_key: Arc::from(config.api_key.as_str()),
    };

    let router = Router::new()
        .route("/admin/status", get(handlers::get_status))
        .route("/admin/targets", get(handlers::get_targets))
        .route("/admin/circuits", get(handlers::get_circuits))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::admin_auth_middleware,
        ))
        .with_state(state);

    let listener = TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "Admin server listening");

    axum::serve(listener, router).await
}

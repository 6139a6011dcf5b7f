//! # HTTP Server
//!
//! Serves the identity service's query/mutation surface as JSON routes.
//! The auth context resolver runs as a request extractor, so every
//! handler receives an already-resolved caller identity.

pub mod auth_routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthService;

/// Shared application state
pub struct AppState {
    pub service: AuthService,
}

/// Assemble the full application router
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", auth_routes::auth_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// HTTP server wrapping the router with bind/serve lifecycle
pub struct HttpServer {
    state: Arc<AppState>,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(service: AuthService, addr: SocketAddr) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            addr,
        }
    }

    /// Bind and serve until ctrl-c
    pub async fn start(self) -> std::io::Result<()> {
        let router = app_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "identity service listening");
        tokio::spawn(purge_loop(self.state));
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

/// Hourly sweep of expired token rows
async fn purge_loop(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        interval.tick().await;
        if let Err(e) = state.service.purge_expired_tokens() {
            tracing::warn!(error = %e, "token purge failed");
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}

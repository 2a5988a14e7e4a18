//! Web server module.
//!
//! JSON API consumed by the display layer. The engine does the measuring;
//! handlers only translate between HTTP and engine calls.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::session::Engine;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub engine: Engine,
}

/// Web server for netpulse.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, engine: Engine) -> Self {
        Self {
            state: AppState { config, engine },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // API endpoints
            .route("/api/endpoints", get(handlers::handle_get_endpoints))
            .route("/api/endpoints/select", post(handlers::handle_select_endpoint))
            .route("/api/endpoints/nearest", post(handlers::handle_select_nearest))
            .route("/api/config", get(handlers::handle_get_config).post(handlers::handle_set_config))
            .route("/api/policy", get(handlers::handle_get_policy).post(handlers::handle_set_policy))
            .route("/api/session/start", post(handlers::handle_start))
            .route("/api/session/stop", post(handlers::handle_stop))
            .route("/api/session/live", get(handlers::handle_live))
            .route("/api/history", get(handlers::handle_history))
            // Static assets
            .route("/favicon.ico", get(handlers::handle_favicon))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024)) // 64KB, requests are tiny
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

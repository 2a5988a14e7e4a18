//! netpulse - Round-Trip Latency Measurement Service
//!
//! Probes a catalog of HTTP endpoints, aggregates per-session latency,
//! jitter and packet-loss statistics, and serves a JSON API for the
//! display layer.

mod catalog;
mod config;
mod probe;
mod selector;
mod session;
mod stats;
mod web;

use catalog::Catalog;
use config::ServerConfig;
use probe::{HttpProber, Prober};
use session::Engine;
use web::Server;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("netpulse=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting netpulse on port {}...", cfg.http_port);

    let catalog = Catalog::default();
    let prober: Arc<dyn Prober> = Arc::new(HttpProber::new()?);

    let engine = Engine::new(catalog, prober, Duration::from_millis(cfg.probe_timeout_ms));

    // Pick a default target before serving.
    let nearest = engine.auto_select().await;
    tracing::info!("Default endpoint: {} ({})", nearest.id, nearest.url);

    // Start web server
    let server = Server::new(cfg, engine);
    server.start().await?;

    Ok(())
}

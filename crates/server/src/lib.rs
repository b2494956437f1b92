//! Tollgate server library.
//!
//! Provides a reusable server function to serve Tollgate either for the
//! binary, or for the integration tests.

#![deny(missing_docs)]

mod admin;
mod api;
mod health;
mod rate_limit;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::{
    Router,
    routing::{get, post},
};
use config::Config;
use engine::RateLimitEngine;
use tokio::net::TcpListener;

/// Configuration for serving Tollgate.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized Tollgate TOML configuration.
    pub config: Config,
}

/// Build the Tollgate router around a running engine.
///
/// The storefront endpoints sit behind the rate-limit layer; the health and
/// admin surfaces are deliberately unrated.
pub fn router(config: &config::ServerConfig, engine: Arc<RateLimitEngine>) -> Router {
    let rated: Router<Arc<RateLimitEngine>> = Router::new()
        .route("/api/search", get(api::search))
        .route("/api/checkout", post(api::checkout))
        .route("/api/profile", get(api::profile))
        .layer(rate_limit::RateLimitLayer::new(engine.clone()));

    let mut app = Router::new().merge(rated).nest("/admin", admin::router());

    if config.health.enabled {
        app = app.route(&config.health.path, get(health::health));
    }

    app.with_state(engine)
}

/// Starts and runs the Tollgate server with the provided configuration.
pub async fn serve(ServeConfig { listen_address, config }: ServeConfig) -> anyhow::Result<()> {
    let engine = RateLimitEngine::new(config.engine.clone())
        .await
        .map_err(|e| anyhow!("Failed to initialize the rate-limit engine: {e}"))?;

    let app = router(&config.server, Arc::new(engine));

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    log::info!("API endpoints available at: http://{listen_address}/api");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;

    Ok(())
}

#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code so a bad request can never take the
// simulator down. Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::sync::Arc;

use latency_sim::{Simulation, clock::TokioTimer, config::ServerConfig, routes};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "latency_sim=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables. An unknown polling
    // method ends up here too: the server must not start without one.
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: polling_method={}, process_time_ms={}, error_rate={}, timeout_limit_ms={}, error_distribution={}",
        config.polling_method,
        config.process_time.as_millis(),
        config.error_rate,
        config.timeout_limit.as_millis(),
        config.error_distribution
    );

    let simulation = Simulation::new(Arc::new(TokioTimer), config.simulation_options());
    if config.autostart {
        if let Err(e) = simulation.start(config.initial_params()) {
            tracing::error!("Failed to start initial run: {e}");
            std::process::exit(1);
        }
    }

    let app = routes::router(simulation, config.polling_method, config.reset_defaults());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind {}: {e}", config.listen_addr);
            std::process::exit(1);
        });
    tracing::info!(
        "listening on {} using method: {}",
        config.listen_addr,
        config.polling_method
    );

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}

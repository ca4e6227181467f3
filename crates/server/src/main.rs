//! patientsearch-server: patient search backend binary entrypoint.

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patientsearch_server::config::Config;
use patientsearch_server::state::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Invalid configuration");

    // Log startup info
    tracing::info!(store = %config.map_api, "Local FHIR store configured");
    match &config.external_fhir_api {
        Some(url) => tracing::info!(
            source = %url,
            identity_claim = %config.external_identity_claim,
            "External search enabled"
        ),
        None => tracing::warn!("EXTERNAL_FHIR_API not set, external search disabled"),
    }
    if !config.new_patient_extensions.is_empty() {
        tracing::info!(
            count = config.new_patient_extensions.len(),
            "New patients get default extensions"
        );
    }
    tracing::info!("Rate limiting: {} requests/second", config.rate_limit_rps);

    let addr: SocketAddr = config.bind_address.parse().expect("Invalid bind address");

    // Build application
    let state = AppState::new(config).expect("Failed to initialize application state");
    let app = patientsearch_server::build_app(state);

    // Start server
    tracing::info!("Starting patient search server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server shutdown complete");
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

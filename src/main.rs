//! Hospital staff scheduling core - Axum server
//!
//! Run with: cargo run
//! Then open: http://localhost:7860/health

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};

use hospital_scheduler_core::api::{self, AppState};
use hospital_scheduler_core::catalog::InMemoryCatalog;
use hospital_scheduler_core::config::Config;
use hospital_scheduler_core::model::ModelConfig;
use hospital_scheduler_core::orchestrator::Orchestrator;
use hospital_scheduler_core::registry::InMemoryRunRegistry;
use hospital_scheduler_core::solver::HighsBackend;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let catalog = InMemoryCatalog::new();
    let registry = InMemoryRunRegistry::new();
    let orchestrator = Orchestrator::new(
        catalog.clone(),
        registry,
        Arc::new(HighsBackend),
        ModelConfig::default(),
        &config,
    );

    let state = Arc::new(AppState { catalog, orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::router(state.clone()).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], 7860));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .unwrap();
}

/// Waits for Ctrl-C, then signals the orchestrator (spec §5 "Cancellation":
/// in-flight solves finalize ERROR "cancelled", queued ones ERROR "not
/// started" — no run is left non-terminal across a clean shutdown).
async fn shutdown_signal(state: Arc<AppState>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down orchestrator"),
        Err(err) => tracing::warn!(%err, "failed to listen for ctrl-c"),
    }
    state.orchestrator.shutdown();
}

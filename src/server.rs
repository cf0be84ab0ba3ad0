use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::signal;

use crate::bridge::{serve_artifact, AppState};
use crate::config::RelayConfig;
use crate::negative_cache::NegativeCache;
use crate::race::RaceCoordinator;
use crate::store::ArtifactStore;

/// Builds the proxy's router and serves it until a shutdown signal arrives,
/// carrying the teacher's ctrl-c/SIGTERM graceful-shutdown wiring over onto
/// axum's `with_graceful_shutdown`.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let addr = config.bind_address()?;

    let store = ArtifactStore::new(config.store_root.clone());
    let negative_cache = Arc::new(NegativeCache::new(config.failed_path_cache_ttl()));
    let race = RaceCoordinator::new(store.clone(), negative_cache.clone(), config.upstreams.clone());

    let state = AppState {
        store,
        negative_cache,
        race,
    };

    let app = Router::new()
        .route("/*path", get(serve_artifact).head(serve_artifact))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, upstreams = config.upstreams.len(), "relaycache listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("relaycache shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

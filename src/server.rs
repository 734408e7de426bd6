use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::error::TraceResult;
use crate::metrics::stream;
use crate::AppState;

/// Builds the read-only snapshot router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Stats ───────────────────────────────────────────────
        .route("/api/stats", get(stream::get_stats))
        .route("/api/stats/stream", get(stream::stats_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve in the background. Binding errors surface here;
/// serving errors are logged by the task.
pub async fn spawn(addr: SocketAddr, state: Arc<AppState>) -> TraceResult<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(%local, "serving snapshots on http://{local}/api/stats");

    let app = create_router(state);
    Ok(tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(%err, "snapshot server exited");
        }
    }))
}

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::engine::Snapshot;
use crate::AppState;

// ─── GET /api/stats ──────────────────────────────────────────────
/// Current snapshot as JSON.

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.engine.snapshot())
}

// ─── GET /api/stats/stream ───────────────────────────────────────
/// Server-Sent Events: one snapshot per report interval.

pub async fn stats_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(state.report_interval);

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.engine.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().event("snapshot").data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

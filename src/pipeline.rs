use std::future::Future;
use std::io;
use std::sync::Arc;

use serde::Serialize;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{TraceError, TraceResult};
use crate::event::parse_line;
use crate::metrics::{AggregationEngine, Snapshot};
use crate::reporter::Reporter;
use crate::sink::Sink;
use crate::{server, AppState};

/// Per-run counters for the ingest side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub lines: u64,
    pub events: u64,
    pub completed: u64,
    pub rejected: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ingest: IngestStats,
    pub reports: u64,
    pub interrupted: bool,
    pub final_snapshot: Snapshot,
}

// ─── Ingest loop ─────────────────────────────────────────────────

/// Feed every line through parse → engine → sink, in order.
///
/// Bad lines and bad pairings are reported and skipped. Only a read
/// failure on the source itself ends the loop early.
pub async fn ingest<S>(
    mut lines: S,
    engine: &AggregationEngine,
    sink: &dyn Sink,
    stats: &mut IngestStats,
) -> TraceResult<()>
where
    S: Stream<Item = io::Result<String>> + Unpin,
{
    while let Some(line) = lines.next().await {
        let line = line?;
        stats.lines += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let event = match parse_line(trimmed) {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "skipping malformed line");
                stats.rejected += 1;
                sink.rejected(trimmed, &TraceError::from(err));
                continue;
            }
        };
        stats.events += 1;

        let recorded = engine.apply(&event);
        match recorded.outcome {
            Ok(Some(done)) => {
                stats.completed += 1;
                sink.completed(&done);
            }
            Ok(None) => {}
            Err(err) => {
                stats.rejected += 1;
                sink.rejected(trimmed, &err);
            }
        }
        for ev in &recorded.evicted {
            stats.evicted += 1;
            sink.evicted(ev);
        }
    }
    Ok(())
}

// ─── Full run ────────────────────────────────────────────────────

/// Run both actors until the input ends or `shutdown` resolves.
///
/// Input is applied sequentially, so when the loop exits every read event
/// has been applied. The reporter is then stopped and one last report is
/// emitted.
pub async fn run<S, F>(
    config: &Config,
    lines: S,
    sink: Arc<dyn Sink>,
    shutdown: F,
) -> TraceResult<RunSummary>
where
    S: Stream<Item = io::Result<String>> + Unpin,
    F: Future<Output = ()>,
{
    config.validate()?;
    let engine = Arc::new(AggregationEngine::new(config.top_n, config.retention()));

    // ── Optional HTTP snapshot surface ──────────────────────────
    let http = match config.listen {
        Some(addr) => {
            let state = Arc::new(AppState {
                engine: engine.clone(),
                report_interval: config.report_interval(),
            });
            Some(server::spawn(addr, state).await?)
        }
        None => None,
    };

    // ── Periodic reporter ───────────────────────────────────────
    let reporter = Reporter::spawn(engine.clone(), sink.clone(), config.report_interval());

    // ── Ingest until EOF or shutdown ────────────────────────────
    let mut stats = IngestStats::default();
    let result = {
        let ingest = ingest(lines, &engine, sink.as_ref(), &mut stats);
        tokio::pin!(ingest);
        tokio::pin!(shutdown);
        tokio::select! {
            res = &mut ingest => res.map(|_| false),
            _ = &mut shutdown => {
                info!("shutdown requested, stopping input");
                Ok(true)
            }
        }
    };

    let reports = reporter.stop().await;
    if let Some(handle) = http {
        handle.abort();
    }
    let interrupted = result?;

    let final_snapshot = engine.snapshot();
    sink.report(&final_snapshot);
    info!(
        lines = stats.lines,
        completed = stats.completed,
        rejected = stats.rejected,
        pending = final_snapshot.pending,
        "input drained"
    );

    Ok(RunSummary {
        ingest: stats,
        reports: reports + 1,
        interrupted,
        final_snapshot,
    })
}

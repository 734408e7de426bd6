use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{info, warn};

use op_duration_tracker::cli::Cli;
use op_duration_tracker::{demo, logging, pipeline, ConsoleSink, Sink};

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "cannot listen for ctrl-c; running until input ends");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── 1. Logging & configuration ───────────────────────────────
    logging::init_logging(cli.verbose);
    let config = cli.resolve_config().context("invalid configuration")?;
    info!(?config, "starting");

    let sink: Arc<dyn Sink> = Arc::new(ConsoleSink);

    // ── 2. Pick the input and run until it ends ──────────────────
    let summary = match (cli.demo, &cli.input) {
        (Some(operations), _) => {
            let pace = Duration::from_millis(cli.demo_pace_ms);
            pipeline::run(&config, demo::lines(operations, cli.seed, pace), sink, ctrl_c()).await
        }
        (None, Some(path)) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            let lines = LinesStream::new(BufReader::new(file).lines());
            pipeline::run(&config, lines, sink, ctrl_c()).await
        }
        (None, None) => {
            let lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
            pipeline::run(&config, lines, sink, ctrl_c()).await
        }
    }
    .context("processing input")?;

    // ── 3. Done ──────────────────────────────────────────────────
    info!(
        lines = summary.ingest.lines,
        completed = summary.ingest.completed,
        rejected = summary.ingest.rejected,
        evicted = summary.ingest.evicted,
        reports = summary.reports,
        interrupted = summary.interrupted,
        "finished"
    );
    Ok(())
}

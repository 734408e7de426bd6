//! Pairs operation start/finish log events, emits each duration as soon as
//! it resolves, and keeps a running average plus the longest durations for
//! a periodic reporter.

use std::sync::Arc;
use std::time::Duration;

pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod event;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reporter;
pub mod server;
pub mod sink;

pub use config::Config;
pub use error::{ParseError, TraceError, TraceResult};
pub use event::{parse_line, Event, Phase};
pub use metrics::{AggregationEngine, Completed, OpDuration, Snapshot};
pub use pipeline::{ingest, run, IngestStats, RunSummary};
pub use reporter::Reporter;
pub use sink::{ConsoleSink, MemorySink, Sink, SinkRecord};

/// Shared state for the HTTP handlers via `State<Arc<AppState>>`.
pub struct AppState {
    /// Same engine the ingest task writes to; handlers only snapshot it.
    pub engine: Arc<AggregationEngine>,

    /// Push period for the SSE stream.
    pub report_interval: Duration,
}

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::warn;

use super::accumulator::Accumulator;
use super::pairing::{Evicted, EvictionKind, PairingTable, RetentionPolicy};
use super::percentiles::{DurationHistogram, PercentileSet};
use super::top_n::TopN;
use super::{format_ms, Completed, OpDuration};
use crate::error::{TraceError, TraceResult};
use crate::event::Event;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe aggregation engine.
/// The ingest task calls `record_event()`, the reporter calls `snapshot()`.
/// One lock covers pairing and both statistics, so a snapshot sees every
/// completed duration in full or not at all.
pub struct AggregationEngine {
    inner: Mutex<Inner>,
}

/// Everything one event did to the engine.
#[derive(Debug)]
pub struct Recorded {
    pub outcome: TraceResult<Option<Completed>>,
    /// Pending records dropped by the retention policy while applying it.
    pub evicted: Vec<Evicted>,
}

/// Point-in-time copy handed to the reporter. Owns all its data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Mean duration in microseconds; 0 before the first completion.
    pub average_us: f64,
    /// Largest durations, descending.
    pub top: Vec<OpDuration>,

    // Counters
    pub completed: u64,
    pub pending: usize,
    pub causality_errors: u64,
    pub abandoned: u64,
    pub orphaned: u64,

    pub percentiles: PercentileSet,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// `Average: 1200ms`
    pub fn average_line(&self) -> String {
        format!("Average: {}ms", format_ms(self.average_us))
    }

    /// `Top: 2000ms, 400ms`
    pub fn top_line(&self) -> String {
        if self.top.is_empty() {
            return "Top: -".to_owned();
        }
        let ranked: Vec<String> = self.top.iter().map(ToString::to_string).collect();
        format!("Top: {}", ranked.join(", "))
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.average_line())?;
        write!(f, "{}", self.top_line())
    }
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    pairing: PairingTable,
    top: TopN,
    accumulator: Accumulator,
    histogram: DurationHistogram,

    causality_errors: u64,
    abandoned: u64,
    orphaned: u64,
}

// ─── AggregationEngine impl ──────────────────────────────────────

impl AggregationEngine {
    pub fn new(top_n: usize, retention: RetentionPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::new(top_n, retention)),
        }
    }

    /// Apply one event and report every side effect.
    pub fn apply(&self, event: &Event) -> Recorded {
        let recorded = self.inner.lock().apply(event, Instant::now());

        log_evictions(&recorded.evicted);
        if let Err(err @ TraceError::Causality { .. }) = &recorded.outcome {
            warn!(%err, "discarding negative duration");
        }

        recorded
    }

    /// Apply one event; `Some` when it completed a pairing.
    pub fn record_event(&self, event: &Event) -> TraceResult<Option<Completed>> {
        self.apply(event).outcome
    }

    /// Age out pending records without waiting for the next event.
    pub fn sweep(&self) -> Vec<Evicted> {
        let evicted = self.inner.lock().evict_expired(Instant::now());
        log_evictions(&evicted);
        evicted
    }

    /// Produce a consistent, copy-isolated snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().snapshot()
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pairing.len()
    }
}

fn log_evictions(evicted: &[Evicted]) {
    for ev in evicted {
        match ev.kind {
            EvictionKind::AbandonedOperation => warn!(
                operation_id = %ev.operation_id,
                started_at = %ev.seen_at,
                "abandoned operation evicted from pending table"
            ),
            EvictionKind::OrphanFinish => warn!(
                operation_id = %ev.operation_id,
                finished_at = %ev.seen_at,
                "orphan finish evicted from pending table"
            ),
        }
    }
}

impl Default for AggregationEngine {
    fn default() -> Self {
        Self::new(3, RetentionPolicy::default())
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new(top_n: usize, retention: RetentionPolicy) -> Self {
        Self {
            pairing: PairingTable::new(retention),
            top: TopN::new(top_n),
            accumulator: Accumulator::new(),
            histogram: DurationHistogram::new(),
            causality_errors: 0,
            abandoned: 0,
            orphaned: 0,
        }
    }

    fn apply(&mut self, event: &Event, now: Instant) -> Recorded {
        let outcome = self
            .pairing
            .record(&event.operation_id, event.phase, event.timestamp, now);

        match &outcome {
            Ok(Some(done)) => {
                self.top.insert(done.duration);
                self.accumulator.add(done.duration);
                self.histogram.record(done.duration);
            }
            Err(TraceError::Causality { .. }) => self.causality_errors += 1,
            _ => {}
        }

        let evicted = self.evict_expired(now);
        Recorded { outcome, evicted }
    }

    fn evict_expired(&mut self, now: Instant) -> Vec<Evicted> {
        let evicted = self.pairing.evict_expired(now);
        for ev in &evicted {
            match ev.kind {
                EvictionKind::AbandonedOperation => self.abandoned += 1,
                EvictionKind::OrphanFinish => self.orphaned += 1,
            }
        }
        evicted
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            average_us: self.accumulator.average(),
            top: self.top.snapshot(),
            completed: self.accumulator.count(),
            pending: self.pairing.len(),
            causality_errors: self.causality_errors,
            abandoned: self.abandoned,
            orphaned: self.orphaned,
            percentiles: self.histogram.percentiles(),
            taken_at: Utc::now(),
        }
    }
}

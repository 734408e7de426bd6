use std::io::Write;

use parking_lot::Mutex;

use crate::error::TraceError;
use crate::metrics::{Completed, Evicted, EvictionKind, Snapshot};

/// Where results go. Durations and reports are the main output; rejected
/// lines and evictions are the error channel.
pub trait Sink: Send + Sync {
    fn completed(&self, done: &Completed);
    fn report(&self, snapshot: &Snapshot);
    fn rejected(&self, line: &str, err: &TraceError);
    fn evicted(&self, evicted: &Evicted);
}

// ─── Console ─────────────────────────────────────────────────────

/// Durations and reports on stdout, everything else on stderr.
/// Write failures (closed pipe) are ignored.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn completed(&self, done: &Completed) {
        let _ = writeln!(std::io::stdout().lock(), "{done}");
    }

    fn report(&self, snapshot: &Snapshot) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out);
        let _ = writeln!(out, "{snapshot}");
    }

    fn rejected(&self, line: &str, err: &TraceError) {
        let _ = writeln!(std::io::stderr().lock(), "rejected {line:?}: {err}");
    }

    fn evicted(&self, evicted: &Evicted) {
        let label = match evicted.kind {
            EvictionKind::AbandonedOperation => "abandoned operation",
            EvictionKind::OrphanFinish => "orphan finish",
        };
        let _ = writeln!(
            std::io::stderr().lock(),
            "{label}: {} (seen at {})",
            evicted.operation_id,
            evicted.seen_at
        );
    }
}

// ─── In-memory ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SinkRecord {
    Completed(Completed),
    Report(Snapshot),
    Rejected { line: String, error: String },
    Evicted(Evicted),
}

/// Keeps everything it receives, in order. Handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SinkRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }

    /// Just the `"<id> finished in <d>ms"` lines.
    pub fn duration_lines(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                SinkRecord::Completed(done) => Some(done.to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn reports(&self) -> Vec<Snapshot> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                SinkRecord::Report(snap) => Some(snap.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn rejected_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| matches!(r, SinkRecord::Rejected { .. }))
            .count()
    }
}

impl Sink for MemorySink {
    fn completed(&self, done: &Completed) {
        self.records.lock().push(SinkRecord::Completed(done.clone()));
    }

    fn report(&self, snapshot: &Snapshot) {
        self.records.lock().push(SinkRecord::Report(snapshot.clone()));
    }

    fn rejected(&self, line: &str, err: &TraceError) {
        self.records.lock().push(SinkRecord::Rejected {
            line: line.to_owned(),
            error: err.to_string(),
        });
    }

    fn evicted(&self, evicted: &Evicted) {
        self.records.lock().push(SinkRecord::Evicted(evicted.clone()));
    }
}

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result alias used across the library.
pub type TraceResult<T> = Result<T, TraceError>;

// ─── Parse failures ──────────────────────────────────────────────

/// Why a single input line was rejected. The line is skipped; the
/// stream keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected 4 fields, found {found}: {line:?}")]
    FieldCount { found: usize, line: String },

    #[error("unparseable timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },

    #[error("expected keyword \"Operation\", found {0:?}")]
    Keyword(String),

    #[error("unknown phase {0:?} (expected started|finished)")]
    Phase(String),
}

// ─── Library error ───────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Finish observed before start. Excluded from every statistic.
    #[error(
        "operation {operation_id} finished at {finished_at} before it started at {started_at}"
    )]
    Causality {
        operation_id: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },

    #[error("operation {0} has a duration that does not fit in microseconds")]
    DurationOverflow(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

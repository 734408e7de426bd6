pub mod accumulator;
pub mod engine;
pub mod pairing;
pub mod percentiles;
pub mod stream;
pub mod top_n;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use accumulator::Accumulator;
pub use engine::{AggregationEngine, Recorded, Snapshot};
pub use pairing::{Evicted, EvictionKind, PairingTable, RetentionPolicy};
pub use percentiles::PercentileSet;
pub use top_n::TopN;

/// Time between a start and its finish, in microseconds.
/// Never negative: a finish before its start is rejected upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct OpDuration(u64);

impl OpDuration {
    pub const fn from_micros(us: u64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1_000)
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", format_ms(self.0 as f64))
    }
}

/// Shortest decimal rendering of a microsecond value in milliseconds,
/// rounded to whole microseconds: `2000000.0` → `"2000"`, `400500.0` → `"400.5"`.
pub fn format_ms(micros: f64) -> String {
    let ms = micros.round() / 1_000.0;
    format!("{ms}")
}

/// A resolved pairing, handed to the sink the moment it happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completed {
    pub operation_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: OpDuration,
}

impl fmt::Display for Completed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} finished in {}", self.operation_id, self.duration)
    }
}

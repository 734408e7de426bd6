use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ParseError;

/// Literal second field of every input line.
const KEYWORD: &str = "Operation";

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Started,
    Finished,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "finished" => Ok(Self::Finished),
            other => Err(ParseError::Phase(other.to_owned())),
        }
    }
}

/// One lifecycle event: `<timestamp> Operation <id> <phase>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub operation_id: String,
    pub phase: Phase,
}

impl Event {
    pub fn new(
        timestamp: DateTime<Utc>,
        operation_id: impl Into<String>,
        phase: Phase,
    ) -> Self {
        Self {
            timestamp,
            operation_id: operation_id.into(),
            phase,
        }
    }

    /// Render back into the input line format (millisecond timestamps).
    pub fn to_line(&self) -> String {
        format!(
            "{} {KEYWORD} {} {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.operation_id,
            self.phase
        )
    }
}

// ─── Parser ──────────────────────────────────────────────────────

/// Parse one input line. Any RFC 3339 offset is accepted and normalised
/// to UTC.
pub fn parse_line(line: &str) -> Result<Event, ParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [ts, keyword, id, phase] = fields.as_slice() else {
        return Err(ParseError::FieldCount {
            found: fields.len(),
            line: line.to_owned(),
        });
    };

    let timestamp = DateTime::parse_from_rfc3339(ts)
        .map_err(|e| ParseError::Timestamp {
            value: (*ts).to_owned(),
            reason: e.to_string(),
        })?
        .with_timezone(&Utc);

    if *keyword != KEYWORD {
        return Err(ParseError::Keyword((*keyword).to_owned()));
    }

    Ok(Event {
        timestamp,
        operation_id: (*id).to_owned(),
        phase: phase.parse()?,
    })
}

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};
use crate::metrics::RetentionPolicy;

// ─── Configuration ───────────────────────────────────────────────

/// Runtime settings. Every field has a default, so an empty TOML file
/// (or no file at all) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How many of the longest durations each report lists
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Seconds between periodic reports
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Seconds a half-seen operation may wait for its partner after arriving
    #[serde(default = "default_max_pending_age_secs")]
    pub max_pending_age_secs: u64,

    /// Cap on half-seen operations held at once
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Serve snapshots over HTTP on this address
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

fn default_top_n() -> usize {
    3
}
fn default_report_interval_secs() -> u64 {
    10
}
fn default_max_pending_age_secs() -> u64 {
    3_600
}
fn default_max_pending() -> usize {
    100_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            report_interval_secs: default_report_interval_secs(),
            max_pending_age_secs: default_max_pending_age_secs(),
            max_pending: default_max_pending(),
            listen: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> TraceResult<Self> {
        toml::from_str(raw).map_err(|e| TraceError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> TraceResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> TraceResult<()> {
        if self.top_n == 0 {
            return Err(TraceError::Config("top_n must be at least 1".into()));
        }
        if self.report_interval_secs == 0 {
            return Err(TraceError::Config(
                "report_interval_secs must be at least 1".into(),
            ));
        }
        if self.max_pending == 0 {
            return Err(TraceError::Config("max_pending must be at least 1".into()));
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age: Duration::from_secs(self.max_pending_age_secs),
            max_pending: self.max_pending,
        }
    }
}

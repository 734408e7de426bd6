use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::error::TraceResult;

/// Pair operation start/finish log lines, print each duration as it
/// resolves, and report the average and longest durations periodically.
#[derive(Parser, Debug)]
#[command(name = "op-duration-tracker", version, about)]
pub struct Cli {
    /// Log file to read (stdin when omitted)
    #[arg(value_name = "FILE", conflicts_with = "demo")]
    pub input: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of longest durations to report
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Seconds between reports
    #[arg(long = "report-interval", value_name = "SECS")]
    pub report_interval_secs: Option<u64>,

    /// Seconds a half-seen operation may wait before it is dropped
    #[arg(long = "max-pending-age", value_name = "SECS")]
    pub max_pending_age_secs: Option<u64>,

    /// Most half-seen operations kept at once
    #[arg(long)]
    pub max_pending: Option<usize>,

    /// Serve snapshots over HTTP (e.g. 127.0.0.1:3000)
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Replay N synthetic operations instead of reading input
    #[arg(long, value_name = "N")]
    pub demo: Option<usize>,

    /// Seed for --demo
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Delay between synthetic lines, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub demo_pace_ms: u64,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// File (if any) first, then flags on top, then validation.
    pub fn resolve_config(&self) -> TraceResult<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(v) = self.top_n {
            cfg.top_n = v;
        }
        if let Some(v) = self.report_interval_secs {
            cfg.report_interval_secs = v;
        }
        if let Some(v) = self.max_pending_age_secs {
            cfg.max_pending_age_secs = v;
        }
        if let Some(v) = self.max_pending {
            cfg.max_pending = v;
        }
        if self.listen.is_some() {
            cfg.listen = self.listen;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "top_n = 5\nreport_interval_secs = 30").unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let cli = Cli::parse_from(["op-duration-tracker", "-c", &path, "--top-n", "7", "-vv"]);
        let cfg = cli.resolve_config().unwrap();
        assert_eq!(cfg.top_n, 7);
        assert_eq!(cfg.report_interval_secs, 30);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::parse_from(["op-duration-tracker", "--report-interval", "0"]);
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn demo_conflicts_with_input_file() {
        let res = Cli::try_parse_from(["op-duration-tracker", "--demo", "5", "trace.log"]);
        assert!(res.is_err());
    }
}

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tokio_stream::{Stream, StreamExt};

use crate::event::{Event, Phase};

// ─── Constants ───────────────────────────────────────────────────

/// Gap between consecutive operation starts.
const MAX_START_GAP_MS: i64 = 500;
/// Operation length range.
const MIN_DURATION_MS: i64 = 10;
const MAX_DURATION_MS: i64 = 5_000;

// ─── Generator ───────────────────────────────────────────────────

/// Build `operations` start/finish pairs with random 8-hex-digit ids,
/// returned in timestamp order so pairs interleave the way real logs do.
/// The same seed always produces the same events.
pub fn generate(operations: usize, seed: u64, origin: DateTime<Utc>) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ids = HashSet::with_capacity(operations);
    let mut events = Vec::with_capacity(operations * 2);
    let mut clock = origin;

    for _ in 0..operations {
        let id = loop {
            let candidate = format!("{:08x}", rng.gen::<u32>());
            if ids.insert(candidate.clone()) {
                break candidate;
            }
        };

        clock += TimeDelta::milliseconds(rng.gen_range(0..=MAX_START_GAP_MS));
        let length = TimeDelta::milliseconds(rng.gen_range(MIN_DURATION_MS..=MAX_DURATION_MS));

        events.push(Event::new(clock, id.clone(), Phase::Started));
        events.push(Event::new(clock + length, id, Phase::Finished));
    }

    // Stable: a zero-gap start keeps its place ahead of a same-instant finish.
    events.sort_by_key(|e| e.timestamp);
    events
}

/// Generated events rendered as input lines, one every `pace`.
pub fn lines(
    operations: usize,
    seed: u64,
    pace: Duration,
) -> impl Stream<Item = io::Result<String>> + Unpin {
    let lines: Vec<io::Result<String>> = generate(operations, seed, Utc::now())
        .iter()
        .map(|e| Ok(e.to_line()))
        .collect();
    Box::pin(tokio_stream::iter(lines).throttle(pace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_line;
    use crate::metrics::AggregationEngine;
    use chrono::TimeZone;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 9, 4, 50, 10).unwrap()
    }

    #[test]
    fn same_seed_same_events() {
        assert_eq!(generate(50, 7, origin()), generate(50, 7, origin()));
        assert_ne!(generate(50, 7, origin()), generate(50, 8, origin()));
    }

    #[test]
    fn every_operation_pairs_exactly_once() {
        let events = generate(200, 1, origin());
        assert_eq!(events.len(), 400);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let engine = AggregationEngine::default();
        let mut completed = 0;
        for ev in &events {
            let line = ev.to_line();
            if engine.record_event(&parse_line(&line).unwrap()).unwrap().is_some() {
                completed += 1;
            }
        }
        assert_eq!(completed, 200);
        assert_eq!(engine.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn paced_lines_parse() {
        let collected: Vec<_> = lines(3, 9, Duration::from_millis(10)).collect().await;
        assert_eq!(collected.len(), 6);
        for line in collected {
            assert!(parse_line(&line.unwrap()).is_ok());
        }
    }
}

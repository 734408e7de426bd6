use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::{Completed, OpDuration};
use crate::error::{TraceError, TraceResult};
use crate::event::Phase;

// ─── Retention ───────────────────────────────────────────────────

/// Bounds on how long, and how many, half-seen operations are kept.
///
/// Age is measured from when a record arrived, not from the timestamps
/// inside the log lines, so a skewed clock upstream cannot age out
/// unrelated operations.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// How long a record may wait for its partner after arriving.
    pub max_age: Duration,
    /// Hard cap on pending records; oldest arrivals go first.
    pub max_pending: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(3_600),
            max_pending: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionKind {
    /// Started, never finished.
    AbandonedOperation,
    /// Finished, never started (or its start was already evicted).
    OrphanFinish,
}

/// A pending record dropped by the retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evicted {
    pub operation_id: String,
    pub kind: EvictionKind,
    /// Log timestamp of the phase that was seen.
    pub seen_at: DateTime<Utc>,
}

// ─── Pending records ─────────────────────────────────────────────

/// Ordering key for the age index: arrival instant, then insertion
/// sequence so equal instants never collide.
type AgeKey = (Instant, u64);

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingRecord {
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    age_key: AgeKey,
}

impl PendingRecord {
    fn slot_mut(&mut self, phase: Phase) -> &mut Option<DateTime<Utc>> {
        match phase {
            Phase::Started => &mut self.started_at,
            Phase::Finished => &mut self.finished_at,
        }
    }
}

/// Operation id → half-seen record. Entries leave the table the moment
/// both phases are known, or when the retention policy drops them.
#[derive(Debug)]
pub struct PairingTable {
    pending: HashMap<String, PendingRecord>,
    by_age: BTreeMap<AgeKey, String>,
    next_seq: u64,
    policy: RetentionPolicy,
}

impl PairingTable {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            pending: HashMap::new(),
            by_age: BTreeMap::new(),
            next_seq: 0,
            policy,
        }
    }

    /// Apply one phase for one operation, which arrived at `now`.
    ///
    /// Returns the completed pairing once both phases are present. A
    /// repeated phase for a still-pending id overwrites the earlier
    /// timestamp and restarts its age. A finish earlier than its start
    /// consumes the record and returns [`TraceError::Causality`].
    pub fn record(
        &mut self,
        operation_id: &str,
        phase: Phase,
        at: DateTime<Utc>,
        now: Instant,
    ) -> TraceResult<Option<Completed>> {
        let Some(rec) = self.pending.get_mut(operation_id) else {
            let age_key = (now, self.bump_seq());
            let mut rec = PendingRecord {
                started_at: None,
                finished_at: None,
                age_key,
            };
            *rec.slot_mut(phase) = Some(at);
            self.pending.insert(operation_id.to_owned(), rec);
            self.by_age.insert(age_key, operation_id.to_owned());
            return Ok(None);
        };

        if let Some(previous) = rec.slot_mut(phase).replace(at) {
            debug!(
                operation_id,
                %phase,
                %previous,
                latest = %at,
                "duplicate phase, keeping latest timestamp"
            );
            let old_key = rec.age_key;
            rec.age_key = (now, self.next_seq);
            self.next_seq += 1;
            self.by_age.remove(&old_key);
            self.by_age.insert(rec.age_key, operation_id.to_owned());
            return Ok(None);
        }

        let (Some(started_at), Some(finished_at)) = (rec.started_at, rec.finished_at) else {
            return Ok(None);
        };
        let age_key = rec.age_key;
        self.pending.remove(operation_id);
        self.by_age.remove(&age_key);

        resolve(operation_id, started_at, finished_at).map(Some)
    }

    /// Drop records that arrived more than `max_age` before `now`, then
    /// the oldest arrivals beyond `max_pending`.
    pub fn evict_expired(&mut self, now: Instant) -> Vec<Evicted> {
        let mut evicted = Vec::new();

        if let Some(cutoff) = now.checked_sub(self.policy.max_age) {
            while let Some(entry) = self.by_age.first_entry() {
                if entry.key().0 >= cutoff {
                    break;
                }
                let (_, id) = entry.remove_entry();
                evicted.extend(self.take_evicted(id));
            }
        }

        while self.pending.len() > self.policy.max_pending {
            let Some((_, id)) = self.by_age.pop_first() else {
                break;
            };
            evicted.extend(self.take_evicted(id));
        }

        evicted
    }

    fn take_evicted(&mut self, operation_id: String) -> Option<Evicted> {
        let rec = self.pending.remove(&operation_id)?;
        let (kind, seen_at) = match (rec.started_at, rec.finished_at) {
            (Some(started), _) => (EvictionKind::AbandonedOperation, started),
            (None, Some(finished)) => (EvictionKind::OrphanFinish, finished),
            (None, None) => return None,
        };
        Some(Evicted {
            operation_id,
            kind,
            seen_at,
        })
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    #[cfg(test)]
    fn get(&self, operation_id: &str) -> Option<&PendingRecord> {
        self.pending.get(operation_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn resolve(
    operation_id: &str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> TraceResult<Completed> {
    let elapsed = finished_at - started_at;
    if elapsed < TimeDelta::zero() {
        return Err(TraceError::Causality {
            operation_id: operation_id.to_owned(),
            started_at,
            finished_at,
        });
    }
    let micros = elapsed
        .num_microseconds()
        .ok_or_else(|| TraceError::DurationOverflow(operation_id.to_owned()))?;

    Ok(Completed {
        operation_id: operation_id.to_owned(),
        started_at,
        finished_at,
        duration: OpDuration::from_micros(micros as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 9, 4, 50, 10).unwrap() + TimeDelta::milliseconds(ms)
    }

    /// Arrival instants as offsets from one fixed base.
    struct Clock(Instant);

    impl Clock {
        fn new() -> Self {
            Self(Instant::now())
        }

        fn at(&self, secs: u64) -> Instant {
            self.0 + Duration::from_secs(secs)
        }
    }

    fn table() -> PairingTable {
        PairingTable::new(RetentionPolicy::default())
    }

    #[test]
    fn start_then_finish_resolves_and_evicts() {
        let clock = Clock::new();
        let mut tbl = table();
        assert!(tbl.record("c1", Phase::Started, t(0), clock.at(0)).unwrap().is_none());
        assert_eq!(tbl.len(), 1);

        let done = tbl.record("c1", Phase::Finished, t(2000), clock.at(0)).unwrap().unwrap();
        assert_eq!(done.duration, OpDuration::from_millis(2000));
        assert!(tbl.is_empty());
        assert!(tbl.evict_expired(clock.at(0)).is_empty());
    }

    #[test]
    fn finish_before_start_in_arrival_order_still_pairs() {
        let clock = Clock::new();
        let mut tbl = table();
        assert!(tbl.record("c1", Phase::Finished, t(400), clock.at(0)).unwrap().is_none());
        let done = tbl.record("c1", Phase::Started, t(0), clock.at(0)).unwrap().unwrap();
        assert_eq!(done.duration, OpDuration::from_millis(400));
    }

    #[test]
    fn duplicate_start_keeps_latest_timestamp() {
        let clock = Clock::new();
        let mut tbl = table();
        tbl.record("c1", Phase::Started, t(0), clock.at(0)).unwrap();
        tbl.record("c1", Phase::Started, t(100), clock.at(0)).unwrap();
        assert_eq!(tbl.get("c1").unwrap().started_at, Some(t(100)));
        assert_eq!(tbl.len(), 1);

        let done = tbl.record("c1", Phase::Finished, t(500), clock.at(0)).unwrap().unwrap();
        assert_eq!(done.duration, OpDuration::from_millis(400));
        assert!(tbl.is_empty());
    }

    #[test]
    fn negative_duration_is_a_causality_error_and_clears_record() {
        let clock = Clock::new();
        let mut tbl = table();
        tbl.record("c1", Phase::Started, t(1000), clock.at(0)).unwrap();
        let err = tbl.record("c1", Phase::Finished, t(0), clock.at(0)).unwrap_err();
        assert!(matches!(err, TraceError::Causality { .. }));
        assert!(tbl.is_empty());
    }

    #[test]
    fn id_reappearing_after_resolution_starts_fresh() {
        let clock = Clock::new();
        let mut tbl = table();
        tbl.record("c1", Phase::Started, t(0), clock.at(0)).unwrap();
        tbl.record("c1", Phase::Finished, t(10), clock.at(0)).unwrap();
        assert!(tbl.record("c1", Phase::Started, t(20), clock.at(0)).unwrap().is_none());
        let done = tbl.record("c1", Phase::Finished, t(50), clock.at(0)).unwrap().unwrap();
        assert_eq!(done.duration, OpDuration::from_millis(30));
    }

    #[test]
    fn evicts_by_arrival_age() {
        let clock = Clock::new();
        let mut tbl = PairingTable::new(RetentionPolicy {
            max_age: Duration::from_secs(10),
            max_pending: 100,
        });
        tbl.record("old", Phase::Started, t(0), clock.at(0)).unwrap();
        tbl.record("orphan", Phase::Finished, t(1_000), clock.at(1)).unwrap();
        tbl.record("young", Phase::Started, t(9_000), clock.at(9)).unwrap();
        assert!(tbl.evict_expired(clock.at(9)).is_empty());

        let evicted = tbl.evict_expired(clock.at(10) + Duration::from_millis(500));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].operation_id, "old");
        assert_eq!(evicted[0].kind, EvictionKind::AbandonedOperation);
        assert_eq!(evicted[0].seen_at, t(0));

        let evicted = tbl.evict_expired(clock.at(12));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].kind, EvictionKind::OrphanFinish);
        assert_eq!(evicted[0].seen_at, t(1_000));
        assert_eq!(tbl.len(), 1);
    }

    #[test]
    fn duplicate_restarts_age() {
        let clock = Clock::new();
        let mut tbl = PairingTable::new(RetentionPolicy {
            max_age: Duration::from_secs(10),
            max_pending: 100,
        });
        tbl.record("retry", Phase::Started, t(0), clock.at(0)).unwrap();
        tbl.record("retry", Phase::Started, t(8_000), clock.at(8)).unwrap();
        assert!(tbl.evict_expired(clock.at(15)).is_empty());
        assert_eq!(tbl.evict_expired(clock.at(19)).len(), 1);
    }

    #[test]
    fn evicts_oldest_arrival_beyond_capacity() {
        let clock = Clock::new();
        let mut tbl = PairingTable::new(RetentionPolicy {
            max_age: Duration::from_secs(86_400),
            max_pending: 2,
        });
        tbl.record("a", Phase::Started, t(5), clock.at(0)).unwrap();
        tbl.record("b", Phase::Started, t(1), clock.at(1)).unwrap();
        tbl.record("c", Phase::Started, t(9), clock.at(2)).unwrap();

        let evicted = tbl.evict_expired(clock.at(2));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].operation_id, "a");
        assert!(tbl.get("b").is_some() && tbl.get("c").is_some());
    }

    #[test]
    fn just_inserted_record_survives_zero_max_age() {
        let clock = Clock::new();
        let mut tbl = PairingTable::new(RetentionPolicy {
            max_age: Duration::ZERO,
            max_pending: 1,
        });
        tbl.record("fresh", Phase::Started, t(0), clock.at(3)).unwrap();
        assert!(tbl.evict_expired(clock.at(3)).is_empty());
        assert_eq!(tbl.len(), 1);
    }

    #[test]
    fn skewed_timestamp_does_not_age_out_other_operations() {
        let clock = Clock::new();
        let mut tbl = PairingTable::new(RetentionPolicy {
            max_age: Duration::from_secs(60),
            max_pending: 100,
        });
        let future = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();

        tbl.record("a", Phase::Started, t(0), clock.at(0)).unwrap();
        tbl.record("skewed", Phase::Started, future, clock.at(1)).unwrap();
        assert!(tbl.evict_expired(clock.at(1)).is_empty());

        let mut completed = 0;
        for (id, offset) in [("a", 0), ("b", 100), ("c", 200)] {
            if id != "a" {
                tbl.record(id, Phase::Started, t(offset), clock.at(2)).unwrap();
            }
            let done = tbl.record(id, Phase::Finished, t(offset + 50), clock.at(2)).unwrap();
            assert!(tbl.evict_expired(clock.at(2)).is_empty());
            completed += usize::from(done.is_some());
        }

        assert_eq!(completed, 3);
        assert_eq!(tbl.len(), 1);
        assert!(tbl.get("skewed").is_some());
    }

    #[test]
    fn finish_for_evicted_start_waits_as_orphan() {
        let clock = Clock::new();
        let mut tbl = PairingTable::new(RetentionPolicy {
            max_age: Duration::from_secs(1),
            max_pending: 100,
        });
        tbl.record("slow", Phase::Started, t(0), clock.at(0)).unwrap();
        assert_eq!(tbl.evict_expired(clock.at(5)).len(), 1);

        assert!(tbl.record("slow", Phase::Finished, t(5_100), clock.at(5)).unwrap().is_none());
        assert_eq!(tbl.get("slow").unwrap().finished_at, Some(t(5_100)));
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::metrics::AggregationEngine;
use crate::sink::Sink;

/// Handle to the periodic reporter task.
pub struct Reporter {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<u64>,
}

impl Reporter {
    /// Start reporting every `period`, first report one period from now.
    /// Ticks are independent of event traffic: a quiet interval repeats
    /// the last known statistics. Each tick also ages out stale pending
    /// records, so retention holds while input is idle.
    pub fn spawn(
        engine: Arc<AggregationEngine>,
        sink: Arc<dyn Sink>,
        period: Duration,
    ) -> Self {
        let (shutdown, mut stop) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = IntervalStream::new(interval);
            let mut emitted = 0u64;

            info!(period_ms = period.as_millis() as u64, "reporter started");
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    Some(_) = ticks.next() => {
                        for evicted in engine.sweep() {
                            sink.evicted(&evicted);
                        }
                        let snapshot = engine.snapshot();
                        debug!(completed = snapshot.completed, "periodic report");
                        sink.report(&snapshot);
                        emitted += 1;
                    }
                }
            }
            info!(emitted, "reporter stopped");
            emitted
        });

        Self { shutdown, handle }
    }

    /// Stop ticking and return how many reports were emitted.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(emitted) => emitted,
            Err(err) => {
                warn!(%err, "reporter task failed");
                0
            }
        }
    }
}

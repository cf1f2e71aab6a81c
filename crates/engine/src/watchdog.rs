//! Drift watchdog: detects a starved runtime.
//!
//! Runs a 1s timer and compares the observed gap between consecutive wake-ups to
//! the ideal period. A gap more than 2s over the period means the runtime was too
//! busy to run timers on time, which would also delay the scheduler's ticks.
//! Diagnostic only: nothing is corrected.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

pub const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);
pub const DRIFT_WARN_THRESHOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DriftWatchdog {
    period: Duration,
    threshold: Duration,
    last_wake: Option<Instant>,
}

impl DriftWatchdog {
    pub fn new(period: Duration, threshold: Duration) -> Self {
        Self {
            period,
            threshold,
            last_wake: None,
        }
    }

    /// Record a wake-up at `now`. Returns the drift when it exceeds the threshold.
    pub fn observe(&mut self, now: Instant) -> Option<Duration> {
        let previous = self.last_wake.replace(now)?;
        let drift = now.saturating_duration_since(previous).saturating_sub(self.period);
        (drift > self.threshold).then_some(drift)
    }

    /// Run the watchdog timer until the task is cancelled.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Some(drift) = self.observe(Instant::now()) {
                tracing::warn!(
                    drift_ms = drift.as_millis() as u64,
                    "Event loop delay detected"
                );
            }
        }
    }
}

impl Default for DriftWatchdog {
    fn default() -> Self {
        Self::new(WATCHDOG_PERIOD, DRIFT_WARN_THRESHOLD)
    }
}

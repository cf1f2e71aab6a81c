//! Tick scheduler: fires the hourly alerts at fixed minutes.
//!
//! Once a minute the scheduler reads the clock in the home timezone and, for each
//! scheduled kind in order (5-min, 3-min, on-time), fires when the minute matches
//! the kind's target minute and the kind has not fired for this (hour, minute) yet.
//! Firing means: recipients from the store → rendered text → job on the sink.
//!
//! A tick runs synchronously from start to finish, so no other task can observe or
//! interleave with a half-evaluated tick.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use tokio::time::{Instant, MissedTickBehavior};

use hourbell_common::config::RuntimeConfig;
use hourbell_common::error::AppError;
use hourbell_common::types::{MessageJob, SubscriptionType};
use hourbell_notifier::JobSink;

use crate::renderer;
use crate::subscription::SubscriptionStore;

/// Scheduler timer period.
pub const TICK_PERIOD: Duration = Duration::from_secs(60);

/// Offset into each minute at which ticks are evaluated.
const TICK_OFFSET: Duration = Duration::from_secs(1);

/// Last (hour, minute) each kind fired at. Absent = never fired.
#[derive(Debug, Clone, Default)]
pub struct TickState {
    last_fired: HashMap<SubscriptionType, (u32, u32)>,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_fired(&self, kind: SubscriptionType) -> Option<(u32, u32)> {
        self.last_fired.get(&kind).copied()
    }

    /// Decide whether `kind` fires at `now`, and if so mark it fired for this minute.
    ///
    /// The mark is made before any side effect runs, so a failed firing is still not
    /// repeated within the same minute.
    pub fn should_fire<T: Timelike>(&mut self, kind: SubscriptionType, now: &T) -> bool {
        let Some(target) = kind.target_minute() else {
            return false;
        };
        if now.minute() != target {
            return false;
        }

        let key = (now.hour(), now.minute());
        if self.last_fired(kind) == Some(key) {
            return false;
        }
        self.last_fired.insert(kind, key);
        true
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fired: Vec<SubscriptionType>,
    pub failed: Vec<SubscriptionType>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.fired.is_empty() && self.failed.is_empty()
    }
}

pub struct TickScheduler {
    store: Arc<SubscriptionStore>,
    sink: Arc<dyn JobSink>,
    config: Arc<RuntimeConfig>,
    timezone: FixedOffset,
    state: std::sync::Mutex<TickState>,
}

impl TickScheduler {
    pub fn new(
        store: Arc<SubscriptionStore>,
        sink: Arc<dyn JobSink>,
        config: Arc<RuntimeConfig>,
        timezone: FixedOffset,
    ) -> Self {
        Self {
            store,
            sink,
            config,
            timezone,
            state: std::sync::Mutex::new(TickState::new()),
        }
    }

    /// Current wall-clock time in the home timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.timezone)
    }

    /// Evaluate one tick against `now`.
    ///
    /// A failure for one kind is logged and mirrored to the debug channel; the
    /// remaining kinds are still evaluated.
    pub fn tick(&self, now: DateTime<FixedOffset>) -> TickReport {
        let mut report = TickReport::default();

        for kind in SubscriptionType::INDIVIDUAL {
            let due = self
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .should_fire(kind, &now);
            if !due {
                continue;
            }

            match self.fire(kind, &now) {
                Ok(()) => report.fired.push(kind),
                Err(e) => {
                    tracing::error!(kind = %kind, error = %e, "Scheduled alert failed");
                    self.report_failure(kind, &e);
                    report.failed.push(kind);
                }
            }
        }

        report
    }

    pub fn last_fired(&self, kind: SubscriptionType) -> Option<(u32, u32)> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_fired(kind)
    }

    fn fire(&self, kind: SubscriptionType, now: &DateTime<FixedOffset>) -> Result<(), AppError> {
        let recipients = self.store.recipients_for(kind);
        let content = renderer::render_alert(kind, now, &recipients)
            .ok_or_else(|| AppError::Unexpected(format!("no alert template for {kind}")))?;

        let job = MessageJob::new(self.config.active_channel(), content)
            .with_delete_after(self.config.retention_seconds());
        let job_id = job.id;

        self.sink
            .enqueue(job)
            .map_err(|e| AppError::Unexpected(format!("could not queue alert: {e}")))?;

        tracing::info!(
            kind = %kind,
            job_id = %job_id,
            hour = now.hour(),
            minute = now.minute(),
            recipients = recipients.len(),
            "Alert queued"
        );
        Ok(())
    }

    /// Best-effort copy of a tick failure to the debug channel.
    fn report_failure(&self, kind: SubscriptionType, error: &AppError) {
        let debug_channel = self.config.debug_channel();
        if !debug_channel.is_set() {
            return;
        }

        let job = MessageJob::new(debug_channel, renderer::render_scheduler_error(kind, error));
        if let Err(e) = self.sink.enqueue(job) {
            tracing::warn!(error = %e, "Could not mirror scheduler error to debug channel");
        }
    }

    /// Run the minute timer until the task is cancelled.
    ///
    /// Evaluates once immediately, then at one second past each minute boundary.
    /// Missed ticks are skipped rather than replayed.
    pub async fn run(&self) {
        let start = Instant::now() + until_next_minute(&self.now()) + TICK_OFFSET;
        let mut interval = tokio::time::interval_at(start, TICK_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(timezone = %self.timezone, "Scheduler started");
        self.tick(self.now());

        loop {
            interval.tick().await;
            let now = self.now();
            let report = self.tick(now);
            if !report.is_idle() {
                tracing::debug!(
                    hour = now.hour(),
                    minute = now.minute(),
                    fired = ?report.fired,
                    failed = ?report.failed,
                    "Tick evaluated"
                );
            }
        }
    }
}

/// Time left until the next minute boundary.
pub fn until_next_minute<T: Timelike>(now: &T) -> Duration {
    let into_minute = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    TICK_PERIOD.saturating_sub(into_minute)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use hourbell_common::types::{ChannelId, UserId};

    use super::*;
    use crate::testing::{MemoryStorage, RecordingSink};

    fn kst(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 14, hour, minute, 0)
            .unwrap()
    }

    struct Fixture {
        scheduler: TickScheduler,
        sink: Arc<RecordingSink>,
        store: Arc<SubscriptionStore>,
    }

    fn fixture(debug_channel: u64) -> Fixture {
        let store = Arc::new(SubscriptionStore::load(Arc::new(MemoryStorage::default())));
        let sink = Arc::new(RecordingSink::default());
        let config =
            Arc::new(RuntimeConfig::new(ChannelId(100), ChannelId(debug_channel), 600).unwrap());
        let scheduler = TickScheduler::new(
            store.clone(),
            sink.clone(),
            config,
            FixedOffset::east_opt(9 * 3600).unwrap(),
        );
        Fixture {
            scheduler,
            sink,
            store,
        }
    }

    #[test]
    fn test_should_fire_once_per_minute() {
        let mut state = TickState::new();
        assert_eq!(state.last_fired(SubscriptionType::FiveMinBefore), None);

        assert!(state.should_fire(SubscriptionType::FiveMinBefore, &kst(14, 55)));
        assert!(!state.should_fire(SubscriptionType::FiveMinBefore, &kst(14, 55)));
        assert_eq!(state.last_fired(SubscriptionType::FiveMinBefore), Some((14, 55)));

        assert!(!state.should_fire(SubscriptionType::FiveMinBefore, &kst(14, 56)));
        assert!(state.should_fire(SubscriptionType::FiveMinBefore, &kst(15, 55)));
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut state = TickState::new();
        assert!(state.should_fire(SubscriptionType::ThreeMinBefore, &kst(9, 57)));
        assert!(!state.should_fire(SubscriptionType::FiveMinBefore, &kst(9, 57)));
        assert!(state.should_fire(SubscriptionType::OnTime, &kst(10, 0)));
        assert!(!state.should_fire(SubscriptionType::All, &kst(10, 0)));
        assert_eq!(state.last_fired(SubscriptionType::FiveMinBefore), None);
    }

    #[tokio::test]
    async fn test_tick_at_55_enqueues_one_job() {
        let f = fixture(0);
        f.store.toggle(UserId(1), SubscriptionType::FiveMinBefore).await;
        f.store.toggle(UserId(2), SubscriptionType::All).await;
        f.store.toggle(UserId(3), SubscriptionType::OnTime).await;

        let report = f.scheduler.tick(kst(14, 55));
        assert_eq!(report.fired, vec![SubscriptionType::FiveMinBefore]);

        let jobs = f.sink.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].channel_id, ChannelId(100));
        assert_eq!(jobs[0].delete_after_secs, Some(600));
        assert!(jobs[0].content.contains("<@1> <@2>"));
        assert!(!jobs[0].content.contains("<@3>"));
        assert_eq!(
            f.scheduler.last_fired(SubscriptionType::FiveMinBefore),
            Some((14, 55))
        );

        // Same minute again: nothing new.
        assert!(f.scheduler.tick(kst(14, 55)).is_idle());
        // Next minute: not a target.
        assert!(f.scheduler.tick(kst(14, 56)).is_idle());
        assert_eq!(f.sink.jobs().len(), 1);

        // Next hour fires again.
        assert_eq!(
            f.scheduler.tick(kst(15, 55)).fired,
            vec![SubscriptionType::FiveMinBefore]
        );
        assert_eq!(f.sink.jobs().len(), 2);
    }

    #[test]
    fn test_full_hour_sequence() {
        let f = fixture(0);
        let mut fired = Vec::new();
        for minute in 0..60 {
            fired.extend(f.scheduler.tick(kst(13, minute)).fired);
        }
        assert_eq!(
            fired,
            vec![
                SubscriptionType::OnTime,
                SubscriptionType::FiveMinBefore,
                SubscriptionType::ThreeMinBefore,
            ]
        );
        assert_eq!(f.sink.jobs().len(), 3);
    }

    /// Rejects everything bound for the alert channel, accepts the rest.
    #[derive(Default)]
    struct AlertChannelDown {
        accepted: std::sync::Mutex<Vec<MessageJob>>,
    }

    impl JobSink for AlertChannelDown {
        fn enqueue(&self, job: MessageJob) -> Result<(), hourbell_notifier::DispatchError> {
            if job.channel_id == ChannelId(100) {
                return Err(hourbell_notifier::DispatchError::Closed);
            }
            self.accepted.lock().unwrap().push(job);
            Ok(())
        }
    }

    #[test]
    fn test_failure_is_marked_and_mirrored() {
        let store = Arc::new(SubscriptionStore::load(Arc::new(MemoryStorage::default())));
        let sink = Arc::new(AlertChannelDown::default());
        let config = Arc::new(RuntimeConfig::new(ChannelId(100), ChannelId(555), 600).unwrap());
        let scheduler = TickScheduler::new(
            store,
            sink.clone(),
            config,
            FixedOffset::east_opt(9 * 3600).unwrap(),
        );

        let report = scheduler.tick(kst(8, 0));
        assert_eq!(report.failed, vec![SubscriptionType::OnTime]);
        assert!(report.fired.is_empty());

        let mirrored = sink.accepted.lock().unwrap().clone();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].channel_id, ChannelId(555));
        assert_eq!(mirrored[0].delete_after_secs, None);
        assert!(mirrored[0].content.contains("on_time"));

        // Marked as fired despite the failure, so a second evaluation this minute is suppressed.
        assert_eq!(scheduler.last_fired(SubscriptionType::OnTime), Some((8, 0)));
        assert!(scheduler.tick(kst(8, 0)).is_idle());
    }

    #[test]
    fn test_closed_sink_without_debug_channel() {
        let f = fixture(0);
        f.sink.close();

        let report = f.scheduler.tick(kst(8, 57));
        assert_eq!(report.failed, vec![SubscriptionType::ThreeMinBefore]);
        assert!(f.sink.jobs().is_empty());
    }

    #[test]
    fn test_retention_change_applies_to_next_job() {
        let store = Arc::new(SubscriptionStore::load(Arc::new(MemoryStorage::default())));
        let sink = Arc::new(RecordingSink::default());
        let config = Arc::new(RuntimeConfig::new(ChannelId(100), ChannelId(0), 600).unwrap());
        let scheduler = TickScheduler::new(
            store,
            sink.clone(),
            config.clone(),
            FixedOffset::east_opt(9 * 3600).unwrap(),
        );

        config.set_retention_seconds(30).unwrap();
        config.set_active_channel(ChannelId(200));
        scheduler.tick(kst(20, 57));

        let jobs = sink.jobs();
        assert_eq!(jobs[0].channel_id, ChannelId(200));
        assert_eq!(jobs[0].delete_after_secs, Some(30));
        assert!(jobs[0].content.contains("Opens at 21:00"));
    }

    #[test]
    fn test_until_next_minute() {
        let at = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 45)
            .unwrap();
        assert_eq!(until_next_minute(&at), Duration::from_secs(15));
        assert_eq!(until_next_minute(&kst(3, 3)), Duration::from_secs(60));
    }
}

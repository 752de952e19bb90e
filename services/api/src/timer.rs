//! services/api/src/timer.rs
//!
//! Optional in-process trigger for the reminder jobs, for deployments without an
//! external cron. Fire times are local times in the configured fixed zone.

use crate::config::ReminderTimes;
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use std::sync::Arc;
use study_tracker_core::{ReminderJob, ReminderScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The first instant strictly after `now` whose local time in `zone` is `at`.
pub fn next_fire(now: DateTime<Utc>, at: NaiveTime, zone: FixedOffset) -> DateTime<Utc> {
    let local_date = now.with_timezone(&zone).date_naive();
    let offset = Duration::seconds(i64::from(zone.local_minus_utc()));
    let candidate = DateTime::<Utc>::from_naive_utc_and_offset(local_date.and_time(at) - offset, Utc);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

pub struct ReminderTimer {
    scheduler: Arc<ReminderScheduler>,
    schedule: Vec<(ReminderJob, NaiveTime)>,
    zone: FixedOffset,
}

impl ReminderTimer {
    pub fn new(scheduler: Arc<ReminderScheduler>, times: &ReminderTimes, zone: FixedOffset) -> Self {
        Self {
            scheduler,
            schedule: vec![
                (ReminderJob::UncheckedNotice, times.unchecked_notice),
                (ReminderJob::MidDayReminder, times.midday_reminder),
                (ReminderJob::LateReminder, times.late_reminder),
            ],
            zone,
        }
    }

    /// The earliest upcoming fire time and every job scheduled for it.
    fn next_due(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<ReminderJob>)> {
        let fires: Vec<(ReminderJob, DateTime<Utc>)> = self
            .schedule
            .iter()
            .map(|(job, at)| (*job, next_fire(now, *at, self.zone)))
            .collect();
        let earliest = fires.iter().map(|(_, at)| *at).min()?;
        let jobs = fires
            .into_iter()
            .filter(|(_, at)| *at == earliest)
            .map(|(job, _)| job)
            .collect();
        Some((earliest, jobs))
    }

    /// Runs until `shutdown` is cancelled. A failing job is logged and the timer moves on.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Reminder timer started");
        loop {
            let now = Utc::now();
            let Some((at, jobs)) = self.next_due(now) else {
                return;
            };
            info!("Next reminder run at {} for {:?}", at, jobs);
            let wait = (at - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reminder timer stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            for job in jobs {
                if let Err(e) = self.scheduler.run(job).await {
                    error!("Scheduled reminder job {} failed: {:?}", job.name(), e);
                }
            }
        }
    }
}

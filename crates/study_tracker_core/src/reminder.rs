//! crates/study_tracker_core/src/reminder.rs
//!
//! Scheduled reminder jobs. Each job reads every active user once, keeps the ones
//! who are behind on a given study day, and pushes them a reminder. Jobs never
//! write to the store.

use crate::clock::StudyDayClock;
use crate::domain::{StudyDay, UserRecord, UserStatus};
use crate::messages;
use crate::ports::{MessagingService, PortResult, UserStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

//=========================================================================================
// Job Definitions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderJob {
    /// Morning check on the study day that just ended.
    UncheckedNotice,
    /// Evening nudge for the current study day.
    MidDayReminder,
    /// Last call before the current study day ends.
    LateReminder,
}

/// When a user counts as done for the target day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Any submission at all.
    AnyReport,
    /// At least `daily_target` submissions.
    TargetMet,
}

#[derive(Debug, Clone, Copy)]
pub struct JobConfig {
    /// Days to step back from the current study day.
    pub days_back: u32,
    pub completion: Completion,
    /// Builds the message from the number of submissions still missing.
    pub message: fn(u32) -> String,
}

impl ReminderJob {
    pub fn name(&self) -> &'static str {
        match self {
            ReminderJob::UncheckedNotice => "unchecked_notice",
            ReminderJob::MidDayReminder => "midday_reminder",
            ReminderJob::LateReminder => "late_reminder",
        }
    }

    pub fn config(&self) -> JobConfig {
        match self {
            ReminderJob::UncheckedNotice => JobConfig {
                days_back: 1,
                completion: Completion::AnyReport,
                message: |_| messages::UNCHECKED_NOTICE.to_string(),
            },
            ReminderJob::MidDayReminder => JobConfig {
                days_back: 0,
                completion: Completion::TargetMet,
                message: |_| messages::MIDDAY_REMINDER.to_string(),
            },
            ReminderJob::LateReminder => JobConfig {
                days_back: 0,
                completion: Completion::TargetMet,
                message: messages::late_reminder,
            },
        }
    }

    /// The study day this job inspects when run at `now`.
    pub fn target_day(&self, clock: &StudyDayClock, now: DateTime<Utc>) -> StudyDay {
        (0..self.config().days_back).fold(clock.day_of(now), |day, _| day.previous())
    }
}

impl Completion {
    fn is_done(&self, user: &UserRecord, day: StudyDay) -> bool {
        let count = user.reports_on(day).len();
        match self {
            Completion::AnyReport => count > 0,
            Completion::TargetMet => count >= user.target() as usize,
        }
    }
}

/// Submissions still missing for `day`, never below 1 so the reminder stays meaningful.
fn remaining(user: &UserRecord, day: StudyDay) -> u32 {
    let count = u32::try_from(user.reports_on(day).len()).unwrap_or(u32::MAX);
    user.target().saturating_sub(count).max(1)
}

/// Users `job` should notify about `day`. Rest days win over any report state.
pub fn select_candidates(job: ReminderJob, users: Vec<UserRecord>, day: StudyDay) -> Vec<UserRecord> {
    let completion = job.config().completion;
    users
        .into_iter()
        .filter(|u| u.status == UserStatus::Active)
        .filter(|u| !u.is_rest_day(day))
        .filter(|u| !completion.is_done(u, day))
        .collect()
}

//=========================================================================================
// The Scheduler
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSummary {
    pub job: ReminderJob,
    pub study_day: StudyDay,
    /// Pushes attempted, successful or not.
    pub notified: usize,
}

pub struct ReminderScheduler {
    store: Arc<dyn UserStore>,
    messenger: Arc<dyn MessagingService>,
    clock: StudyDayClock,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn UserStore>,
        messenger: Arc<dyn MessagingService>,
        clock: StudyDayClock,
    ) -> Self {
        Self {
            store,
            messenger,
            clock,
        }
    }

    pub async fn run(&self, job: ReminderJob) -> PortResult<ReminderSummary> {
        self.run_at(job, Utc::now()).await
    }

    /// Runs `job` as if triggered at `now`.
    ///
    /// Only the initial query can fail the job. Pushes run concurrently and a failed
    /// push is logged and otherwise ignored; the job returns once all have settled.
    pub async fn run_at(&self, job: ReminderJob, now: DateTime<Utc>) -> PortResult<ReminderSummary> {
        let day = job.target_day(&self.clock, now);
        let users = self.store.list_users_by_status(UserStatus::Active, day).await?;
        let candidates = select_candidates(job, users, day);
        let message = job.config().message;

        let pushes = candidates.iter().map(move |user| {
            let text = message(remaining(user, day));
            async move {
                if let Err(e) = self.messenger.push(&user.user_id, &text).await {
                    warn!(job = job.name(), user_id = %user.user_id, "Reminder push failed: {}", e);
                }
            }
        });
        join_all(pushes).await;

        info!(
            job = job.name(),
            study_day = %day,
            notified = candidates.len(),
            "Reminder job finished"
        );
        Ok(ReminderSummary {
            job,
            study_day: day,
            notified: candidates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryUserStore;
    use crate::testing::{RecordingMessenger, Sent};
    use chrono::{FixedOffset, TimeZone};

    fn jst(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, d, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn day(d: u32) -> StudyDay {
        StudyDay::from_ymd(2024, 6, d).unwrap()
    }

    fn active(user_id: &str, target: u32) -> UserRecord {
        UserRecord {
            status: UserStatus::Active,
            daily_target: Some(target),
            ..UserRecord::awaiting_target(user_id)
        }
    }

    fn with_reports(mut user: UserRecord, d: StudyDay, entries: &[u32]) -> UserRecord {
        user.report.insert(d, entries.to_vec());
        user
    }

    fn with_rest(mut user: UserRecord, d: StudyDay) -> UserRecord {
        user.rest.insert(d, true);
        user
    }

    fn ids(users: &[UserRecord]) -> Vec<&str> {
        users.iter().map(|u| u.user_id.as_str()).collect()
    }

    #[test]
    fn target_days_follow_the_job() {
        let clock = StudyDayClock::default();
        let morning = jst(11, 4, 0);
        assert_eq!(ReminderJob::UncheckedNotice.target_day(&clock, morning), day(10));
        assert_eq!(ReminderJob::MidDayReminder.target_day(&clock, jst(10, 22, 0)), day(10));
        // 00:30 still belongs to the 10th.
        assert_eq!(ReminderJob::LateReminder.target_day(&clock, jst(11, 0, 30)), day(10));
    }

    #[test]
    fn unchecked_notice_skips_reporters_and_rest_days() {
        let d = day(10);
        let users = vec![
            active("silent", 3),
            with_rest(active("resting", 3), d),
            with_reports(active("one-report", 5), d, &[1]),
            with_reports(active("other-day", 3), day(9), &[1, 1, 1]),
            UserRecord::awaiting_target("onboarding"),
        ];

        let picked = select_candidates(ReminderJob::UncheckedNotice, users, d);
        assert_eq!(ids(&picked), vec!["silent", "other-day"]);
    }

    #[test]
    fn day_reminders_stop_at_the_target() {
        let d = day(10);
        let users = vec![
            with_reports(active("met", 3), d, &[1, 1, 1]),
            with_reports(active("one-short", 3), d, &[1, 1]),
            with_reports(active("over", 2), d, &[1, 1, 1]),
            with_rest(with_reports(active("rest-and-report", 3), d, &[1]), d),
            UserRecord {
                status: UserStatus::Active,
                ..UserRecord::awaiting_target("default-target")
            },
        ];

        for job in [ReminderJob::MidDayReminder, ReminderJob::LateReminder] {
            let picked = select_candidates(job, users.clone(), d);
            assert_eq!(ids(&picked), vec!["one-short", "default-target"]);
        }
    }

    #[test]
    fn remaining_never_drops_below_one() {
        let d = day(10);
        assert_eq!(remaining(&active("a", 3), d), 3);
        assert_eq!(remaining(&with_reports(active("b", 3), d, &[4, 4]), d), 1);
        assert_eq!(remaining(&with_reports(active("c", 2), d, &[1, 1, 1]), d), 1);
    }

    #[tokio::test]
    async fn late_reminder_tells_each_user_what_is_left() {
        let store = Arc::new(InMemoryUserStore::new());
        store.put(with_reports(active("U1", 4), day(10), &[1])).await;
        store.put(active("U2", 2)).await;
        let messenger = Arc::new(RecordingMessenger::default());
        let scheduler =
            ReminderScheduler::new(store, messenger.clone(), StudyDayClock::default());

        let summary = scheduler
            .run_at(ReminderJob::LateReminder, jst(10, 23, 30))
            .await
            .unwrap();

        assert_eq!(summary.notified, 2);
        assert_eq!(summary.study_day, day(10));
        let mut sent = messenger.sent();
        sent.sort_by_key(|s| format!("{:?}", s));
        assert_eq!(
            sent,
            vec![
                Sent::Push {
                    user_id: "U1".to_string(),
                    text: messages::late_reminder(3),
                },
                Sent::Push {
                    user_id: "U2".to_string(),
                    text: messages::late_reminder(2),
                },
            ]
        );
    }

    #[tokio::test]
    async fn failed_pushes_do_not_abort_the_batch() {
        let store = Arc::new(InMemoryUserStore::new());
        for id in ["U1", "U2", "U3"] {
            store.put(active(id, 3)).await;
        }
        let messenger = Arc::new(RecordingMessenger::failing_for(&["U2"]));
        let scheduler =
            ReminderScheduler::new(store.clone(), messenger.clone(), StudyDayClock::default());

        let summary = scheduler
            .run_at(ReminderJob::MidDayReminder, jst(10, 22, 0))
            .await
            .unwrap();

        assert_eq!(summary.notified, 3);
        assert_eq!(messenger.pushed_to(), vec!["U1", "U2", "U3"]);
        // Jobs are read-only.
        assert!(store.get_user("U1").await.unwrap().unwrap().report.is_empty());
    }

    #[tokio::test]
    async fn unchecked_notice_looks_at_yesterday() {
        let store = Arc::new(InMemoryUserStore::new());
        store.put(with_reports(active("reported", 3), day(10), &[2])).await;
        store.put(with_rest(active("rested", 3), day(10))).await;
        store.put(with_reports(active("only-today", 3), day(11), &[2])).await;
        let messenger = Arc::new(RecordingMessenger::default());
        let scheduler =
            ReminderScheduler::new(store, messenger.clone(), StudyDayClock::default());

        let summary = scheduler
            .run_at(ReminderJob::UncheckedNotice, jst(11, 4, 0))
            .await
            .unwrap();

        assert_eq!(summary.study_day, day(10));
        assert_eq!(summary.notified, 1);
        assert_eq!(
            messenger.sent(),
            vec![Sent::Push {
                user_id: "only-today".to_string(),
                text: messages::UNCHECKED_NOTICE.to_string(),
            }]
        );
    }
}

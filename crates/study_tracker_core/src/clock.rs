//! crates/study_tracker_core/src/clock.rs
//!
//! Maps wall-clock instants onto study days. A study day begins at the cutoff hour
//! in a single fixed civil zone, so late-night reports still count for "today".

use crate::domain::StudyDay;
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};

pub const DEFAULT_CUTOFF_HOUR: u32 = 4;
/// Asia/Tokyo. No DST, so a fixed offset is exact.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyDayClock {
    cutoff_hour: u32,
    zone: FixedOffset,
}

impl StudyDayClock {
    pub fn new(cutoff_hour: u32, zone: FixedOffset) -> Self {
        Self { cutoff_hour, zone }
    }

    /// The study day containing `instant`.
    pub fn day_of(&self, instant: DateTime<Utc>) -> StudyDay {
        let local = instant.with_timezone(&self.zone);
        let day = StudyDay::new(local.date_naive());
        if local.hour() < self.cutoff_hour {
            day.previous()
        } else {
            day
        }
    }

    /// The study day before the one containing `instant`.
    pub fn previous_day_of(&self, instant: DateTime<Utc>) -> StudyDay {
        self.day_of(instant).previous()
    }
}

impl Default for StudyDayClock {
    fn default() -> Self {
        let zone = FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600).unwrap_or(Utc.fix());
        Self::new(DEFAULT_CUTOFF_HOUR, zone)
    }
}

/// Study-day key of `instant` as an ISO date string.
pub fn study_day_key(instant: DateTime<Utc>, cutoff_hour: u32, zone: FixedOffset) -> String {
    StudyDayClock::new(cutoff_hour, zone).day_of(instant).to_string()
}

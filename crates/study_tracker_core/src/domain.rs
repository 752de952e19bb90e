//! crates/study_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or messaging transport.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Target used when a record somehow reached `Active` without one.
pub const DEFAULT_DAILY_TARGET: u32 = 3;

//=========================================================================================
// Study Day
//=========================================================================================

/// A logical tracking day. It starts at the configured cutoff hour, not at midnight,
/// and is rendered as an ISO calendar date (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StudyDay(NaiveDate);

impl StudyDay {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The study day before this one. Saturates at the earliest representable date.
    pub fn previous(&self) -> Self {
        Self(self.0.pred_opt().unwrap_or(self.0))
    }
}

impl fmt::Display for StudyDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for StudyDay {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self)
    }
}

//=========================================================================================
// User Record
//=========================================================================================

/// Where a user is in the onboarding flow. Only ever moves `AwaitingTarget -> Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserStatus {
    AwaitingTarget,
    Active,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::AwaitingTarget => "AWAITING_TARGET",
            UserStatus::Active => "ACTIVE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AWAITING_TARGET" => Some(UserStatus::AwaitingTarget),
            "ACTIVE" => Some(UserStatus::Active),
            _ => None,
        }
    }
}

/// Everything tracked for one messaging user, keyed by the transport's user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    pub status: UserStatus,
    pub daily_target: Option<u32>,
    /// Submissions per study day, in the order they were received.
    pub report: BTreeMap<StudyDay, Vec<u32>>,
    /// Days explicitly marked as rest. Only `true` values are ever stored.
    pub rest: BTreeMap<StudyDay, bool>,
}

impl UserRecord {
    /// A freshly onboarded user with no history.
    pub fn awaiting_target(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            status: UserStatus::AwaitingTarget,
            daily_target: None,
            report: BTreeMap::new(),
            rest: BTreeMap::new(),
        }
    }

    pub fn target(&self) -> u32 {
        self.daily_target.unwrap_or(DEFAULT_DAILY_TARGET)
    }

    pub fn reports_on(&self, day: StudyDay) -> &[u32] {
        self.report.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_rest_day(&self, day: StudyDay) -> bool {
        self.rest.get(&day).copied().unwrap_or(false)
    }

    /// Drops report and rest history for every day except `day`.
    pub fn retain_day(mut self, day: StudyDay) -> Self {
        self.report.retain(|d, _| *d == day);
        self.rest.retain(|d, _| *d == day);
        self
    }
}

//=========================================================================================
// Inbound Events
//=========================================================================================

/// One inbound event from the messaging transport, reduced to what the core needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: String,
    /// Routing token for a synchronous reply. Absent for events that cannot be answered.
    pub reply_token: Option<String>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The user added the bot (follow / subscribe).
    Follow,
    /// A text message, untrimmed.
    Text(String),
    /// Stickers, images, postbacks and anything else the bot does not interpret.
    Unsupported,
}

//! crates/study_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete document store and messaging transport.

use async_trait::async_trait;
use crate::domain::{StudyDay, UserRecord, UserStatus};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Storage for user records.
///
/// Every mutation is a merge: fields it does not name are left untouched, and each
/// call must be atomic for its user. In particular `append_report` must never be
/// implemented as an unguarded read-modify-write of the day's sequence, or two
/// concurrent submissions can lose one entry.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> PortResult<Option<UserRecord>>;

    /// Creates the record if needed and sets `status = AWAITING_TARGET`.
    /// Existing target, reports and rest days are kept.
    async fn begin_onboarding(&self, user_id: &str) -> PortResult<()>;

    /// Sets the daily target, moves the user to `ACTIVE`, and makes sure `report[day]`
    /// exists without clobbering entries already recorded for it.
    async fn activate(&self, user_id: &str, daily_target: u32, day: StudyDay) -> PortResult<()>;

    async fn mark_rest_day(&self, user_id: &str, day: StudyDay) -> PortResult<()>;

    /// Appends one submission to `report[day]` and returns the sequence after the append.
    async fn append_report(&self, user_id: &str, day: StudyDay, sections: u32)
        -> PortResult<Vec<u32>>;

    /// Users with `status`, ordered by user id. Their `report` and `rest` maps hold
    /// `day` only, so the cost does not grow with history.
    async fn list_users_by_status(
        &self,
        status: UserStatus,
        day: StudyDay,
    ) -> PortResult<Vec<UserRecord>>;

    async fn list_users(&self) -> PortResult<Vec<UserRecord>>;
}

/// Outbound chat messages. Both calls are fire-and-forget from the core's point of view.
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Answers one inbound event through its routing token.
    async fn reply(&self, reply_token: &str, text: &str) -> PortResult<()>;

    /// Sends an unsolicited message to a user.
    async fn push(&self, user_id: &str, text: &str) -> PortResult<()>;
}

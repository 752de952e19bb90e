//! crates/study_tracker_core/src/conversation.rs
//!
//! The per-user conversation state machine. One inbound event is interpreted against
//! one user's record, producing at most one reply and the matching store mutations.

use crate::clock::StudyDayClock;
use crate::domain::{EventKind, InboundEvent, UserRecord, UserStatus};
use crate::messages;
use crate::ports::{MessagingService, PortResult, UserStore};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

pub const REST_DAY_KEYWORD: &str = "休養日";
pub const MIN_SECTIONS: u32 = 1;
pub const MAX_SECTIONS: u32 = 50;

//=========================================================================================
// Text Classification
//=========================================================================================

/// How a trimmed text message reads, before the user's state is taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextInput {
    RestDay,
    /// Only ASCII digits. `None` when the value does not fit in a `u32`.
    Number(Option<u32>),
    /// Has a digit somewhere but is not a bare number, e.g. `3つ` or `2 sections`.
    MixedDigits,
    FreeText,
}

fn classify(text: &str) -> TextInput {
    if text == REST_DAY_KEYWORD {
        TextInput::RestDay
    } else if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        TextInput::Number(text.parse().ok())
    } else if text.chars().any(|c| c.is_ascii_digit()) {
        TextInput::MixedDigits
    } else {
        TextInput::FreeText
    }
}

fn progress_reply(count: usize, target: u32) -> String {
    match count.cmp(&(target as usize)) {
        Ordering::Less => messages::recorded(count, target),
        Ordering::Equal => messages::TARGET_MET.to_string(),
        Ordering::Greater => messages::over_achieved(count, target),
    }
}

//=========================================================================================
// Per-User Serialization
//=========================================================================================

/// Hands out one async mutex per user id so events from the same user run one at a
/// time while different users proceed in parallel.
#[derive(Default)]
struct UserLocks {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    const PRUNE_THRESHOLD: usize = 1024;

    async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.len() >= Self::PRUNE_THRESHOLD {
                // Slots are only cloned under this lock, so a count of 1 means idle.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots.entry(user_id.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }
}

//=========================================================================================
// The Engine
//=========================================================================================

pub struct ConversationEngine {
    store: Arc<dyn UserStore>,
    messenger: Arc<dyn MessagingService>,
    clock: StudyDayClock,
    locks: UserLocks,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn UserStore>,
        messenger: Arc<dyn MessagingService>,
        clock: StudyDayClock,
    ) -> Self {
        Self {
            store,
            messenger,
            clock,
            locks: UserLocks::default(),
        }
    }

    /// Handles one event as of now. Returns the reply text that was sent, if any.
    pub async fn handle_event(&self, event: &InboundEvent) -> PortResult<Option<String>> {
        self.handle_event_at(event, Utc::now()).await
    }

    /// Handles one event as if it arrived at `now`.
    ///
    /// Storage and messaging errors propagate unchanged; nothing is retried and the
    /// user is not told about them.
    pub async fn handle_event_at(
        &self,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> PortResult<Option<String>> {
        let reply = {
            let _guard = self.locks.lock(&event.user_id).await;
            match &event.kind {
                EventKind::Follow => {
                    self.store.begin_onboarding(&event.user_id).await?;
                    info!(user_id = %event.user_id, "User started onboarding");
                    Some(messages::ONBOARDING_PROMPT.to_string())
                }
                EventKind::Text(text) => self.interpret_text(&event.user_id, text.trim(), now).await?,
                EventKind::Unsupported => None,
            }
        };

        if let Some(text) = &reply {
            match &event.reply_token {
                Some(token) => self.messenger.reply(token, text).await?,
                None => warn!(user_id = %event.user_id, "Event has no reply token; reply dropped"),
            }
        }
        Ok(reply)
    }

    async fn interpret_text(
        &self,
        user_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<String>> {
        let Some(user) = self.store.get_user(user_id).await? else {
            debug!(user_id = %user_id, "Text from an unknown user ignored");
            return Ok(None);
        };
        match user.status {
            UserStatus::AwaitingTarget => self.register_target(user_id, text, now).await,
            UserStatus::Active => self.record_progress(&user, text, now).await,
        }
    }

    async fn register_target(
        &self,
        user_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<String>> {
        let reply = match classify(text) {
            TextInput::Number(Some(target)) if target >= 1 => {
                let today = self.clock.day_of(now);
                self.store.activate(user_id, target, today).await?;
                info!(user_id = %user_id, target, "User activated");
                messages::target_registered(target)
            }
            TextInput::Number(_) => messages::TARGET_MUST_BE_POSITIVE.to_string(),
            _ => messages::TARGET_MUST_BE_NUMERIC.to_string(),
        };
        Ok(Some(reply))
    }

    async fn record_progress(
        &self,
        user: &UserRecord,
        text: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Option<String>> {
        let today = self.clock.day_of(now);
        let reply = match classify(text) {
            TextInput::RestDay => {
                self.store.mark_rest_day(&user.user_id, today).await?;
                info!(user_id = %user.user_id, study_day = %today, "Rest day recorded");
                messages::REST_DAY_ACK.to_string()
            }
            TextInput::Number(Some(sections)) if (MIN_SECTIONS..=MAX_SECTIONS).contains(&sections) => {
                let entries = self
                    .store
                    .append_report(&user.user_id, today, sections)
                    .await?;
                info!(
                    user_id = %user.user_id,
                    study_day = %today,
                    sections,
                    count = entries.len(),
                    "Report recorded"
                );
                progress_reply(entries.len(), user.target())
            }
            TextInput::Number(_) => messages::SECTIONS_OUT_OF_RANGE.to_string(),
            TextInput::MixedDigits => messages::NUMERIC_ONLY.to_string(),
            TextInput::FreeText => return Ok(None),
        };
        Ok(Some(reply))
    }
}

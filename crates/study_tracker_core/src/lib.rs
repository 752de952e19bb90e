pub mod clock;
pub mod conversation;
pub mod domain;
pub mod memory;
pub mod messages;
pub mod ports;
pub mod reminder;

#[cfg(test)]
mod testing;

pub use clock::{study_day_key, StudyDayClock};
pub use conversation::ConversationEngine;
pub use domain::{EventKind, InboundEvent, StudyDay, UserRecord, UserStatus};
pub use memory::InMemoryUserStore;
pub use ports::{MessagingService, PortError, PortResult, UserStore};
pub use reminder::{ReminderJob, ReminderScheduler, ReminderSummary};

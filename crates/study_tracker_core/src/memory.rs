//! crates/study_tracker_core/src/memory.rs
//!
//! A process-local `UserStore`. Every mutation runs under a single write lock, so
//! each call is atomic with respect to every other call on the same store.

use crate::domain::{StudyDay, UserRecord, UserStatus};
use crate::ports::{PortError, PortResult, UserStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a whole record. Handy for seeding state.
    pub async fn put(&self, record: UserRecord) {
        self.users.write().await.insert(record.user_id.clone(), record);
    }

    fn not_found(user_id: &str) -> PortError {
        PortError::NotFound(format!("User {} not found", user_id))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_user(&self, user_id: &str) -> PortResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn begin_onboarding(&self, user_id: &str) -> PortResult<()> {
        let mut users = self.users.write().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord::awaiting_target(user_id))
            .status = UserStatus::AwaitingTarget;
        Ok(())
    }

    async fn activate(&self, user_id: &str, daily_target: u32, day: StudyDay) -> PortResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord::awaiting_target(user_id));
        record.daily_target = Some(daily_target);
        record.status = UserStatus::Active;
        record.report.entry(day).or_default();
        Ok(())
    }

    async fn mark_rest_day(&self, user_id: &str, day: StudyDay) -> PortResult<()> {
        let mut users = self.users.write().await;
        let record = users.get_mut(user_id).ok_or_else(|| Self::not_found(user_id))?;
        record.rest.insert(day, true);
        Ok(())
    }

    async fn append_report(
        &self,
        user_id: &str,
        day: StudyDay,
        sections: u32,
    ) -> PortResult<Vec<u32>> {
        let mut users = self.users.write().await;
        let record = users.get_mut(user_id).ok_or_else(|| Self::not_found(user_id))?;
        let entries = record.report.entry(day).or_default();
        entries.push(sections);
        Ok(entries.clone())
    }

    async fn list_users_by_status(
        &self,
        status: UserStatus,
        day: StudyDay,
    ) -> PortResult<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.status == status)
            .map(|u| u.clone().retain_day(day))
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(users)
    }

    async fn list_users(&self) -> PortResult<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(users)
    }
}

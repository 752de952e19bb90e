//! Test doubles shared by the core's unit tests.

use crate::ports::{MessagingService, PortError, PortResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Reply { token: String, text: String },
    Push { user_id: String, text: String },
}

/// Records every outbound message. Pushes to ids in `failing` return an error.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    failing: HashSet<String>,
}

impl RecordingMessenger {
    pub fn failing_for(ids: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn pushed_to(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Push { user_id, .. } => Some(user_id),
                Sent::Reply { .. } => None,
            })
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl MessagingService for RecordingMessenger {
    async fn reply(&self, reply_token: &str, text: &str) -> PortResult<()> {
        self.sent.lock().unwrap().push(Sent::Reply {
            token: reply_token.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn push(&self, user_id: &str, text: &str) -> PortResult<()> {
        self.sent.lock().unwrap().push(Sent::Push {
            user_id: user_id.to_string(),
            text: text.to_string(),
        });
        if self.failing.contains(user_id) {
            return Err(PortError::Unexpected(format!("push to {user_id} rejected")));
        }
        Ok(())
    }
}

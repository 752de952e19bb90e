//! services/api/src/adapters/line.rs
//!
//! This module contains the adapter for the LINE Messaging API.
//! It implements the `MessagingService` port from the `core` crate.

use async_trait::async_trait;
use serde::Serialize;
use study_tracker_core::ports::{MessagingService, PortError, PortResult};

//=========================================================================================
// Request Payloads
//=========================================================================================

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> TextMessage<'a> {
    fn new(text: &'a str) -> Self {
        Self { kind: "text", text }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `MessagingService` port using the LINE Messaging API.
#[derive(Clone)]
pub struct LineMessagingAdapter {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl LineMessagingAdapter {
    /// Creates a new `LineMessagingAdapter`. `api_base` has no trailing slash.
    pub fn new(client: reqwest::Client, api_base: String, access_token: String) -> Self {
        Self {
            client,
            api_base,
            access_token,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> PortResult<()> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(PortError::Unauthorized)
            }
            _ => Err(PortError::Unexpected(format!(
                "LINE API {} returned {}: {}",
                path, status, detail
            ))),
        }
    }
}

//=========================================================================================
// `MessagingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessagingService for LineMessagingAdapter {
    async fn reply(&self, reply_token: &str, text: &str) -> PortResult<()> {
        let body = ReplyRequest {
            reply_token,
            messages: [TextMessage::new(text)],
        };
        self.post("/v2/bot/message/reply", &body).await
    }

    async fn push(&self, user_id: &str, text: &str) -> PortResult<()> {
        let body = PushRequest {
            to: user_id,
            messages: [TextMessage::new(text)],
        };
        self.post("/v2/bot/message/push", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_payload_uses_line_field_names() {
        let body = ReplyRequest {
            reply_token: "r-1",
            messages: [TextMessage::new("hi")],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "replyToken": "r-1",
                "messages": [{ "type": "text", "text": "hi" }]
            })
        );
    }

    #[test]
    fn push_payload_targets_the_user() {
        let body = PushRequest {
            to: "U123",
            messages: [TextMessage::new("reminder")],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "to": "U123",
                "messages": [{ "type": "text", "text": "reminder" }]
            })
        );
    }
}

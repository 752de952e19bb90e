//! services/api/src/web/protocol.rs
//!
//! Defines the LINE webhook payload the platform posts to `/webhook`, and its
//! reduction to the core's `InboundEvent`.

use serde::Deserialize;
use study_tracker_core::domain::{EventKind, InboundEvent};

//=========================================================================================
// Messages Sent FROM the LINE Platform TO the Server
//=========================================================================================

/// The webhook body. One request may carry several events, or none (the console's
/// "verify" call sends an empty list).
#[derive(Deserialize, Debug)]
pub struct WebhookRequest {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookEvent {
    /// The user added the bot as a friend or unblocked it.
    Follow {
        #[serde(rename = "replyToken")]
        reply_token: Option<String>,
        source: EventSource,
    },

    /// The user sent a message of any kind.
    Message {
        #[serde(rename = "replyToken")]
        reply_token: Option<String>,
        source: EventSource,
        message: MessageContent,
    },

    /// Unfollow, postback, join and every other event type.
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize, Debug)]
pub struct EventSource {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Text { text: String },
    /// Stickers, images, locations, ...
    #[serde(other)]
    Other,
}

impl WebhookEvent {
    /// The core's view of this event, or `None` when there is nobody to attribute it to.
    pub fn into_inbound(self) -> Option<InboundEvent> {
        let (reply_token, source, kind) = match self {
            WebhookEvent::Follow {
                reply_token,
                source,
            } => (reply_token, source, EventKind::Follow),
            WebhookEvent::Message {
                reply_token,
                source,
                message,
            } => {
                let kind = match message {
                    MessageContent::Text { text } => EventKind::Text(text),
                    MessageContent::Other => EventKind::Unsupported,
                };
                (reply_token, source, kind)
            }
            WebhookEvent::Unsupported => return None,
        };
        Some(InboundEvent {
            user_id: source.user_id?,
            reply_token,
            kind,
        })
    }
}

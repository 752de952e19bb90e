//! services/api/src/web/webhook.rs
//!
//! The LINE webhook endpoint. Each event in a delivery is handed to the
//! `ConversationEngine`; events run concurrently and the engine serializes
//! events that belong to the same user.

use crate::web::{
    protocol::{WebhookEvent, WebhookRequest},
    state::AppState,
};
use axum::{extract::State, http::StatusCode, Json};
use futures::future::join_all;
use std::sync::Arc;
use study_tracker_core::InboundEvent;
use tracing::{error, info};

/// Receive LINE webhook events.
///
/// The request must carry a valid `x-line-signature` header. Responds once every
/// event has been handled; a storage or messaging failure on any event turns the
/// whole delivery into a 500 without affecting the others.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body(content_type = "application/json", description = "LINE webhook payload."),
    responses(
        (status = 200, description = "All events handled"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 500, description = "At least one event failed")
    ),
    params(
        ("x-line-signature" = String, Header, description = "Base64 HMAC-SHA256 of the body.")
    )
)]
pub async fn webhook_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<WebhookRequest>,
) -> Result<&'static str, (StatusCode, String)> {
    let events: Vec<InboundEvent> = request
        .events
        .into_iter()
        .filter_map(WebhookEvent::into_inbound)
        .collect();
    info!("Webhook delivered {} event(s)", events.len());

    let results = join_all(events.iter().map(|event| app_state.engine.handle_event(event))).await;

    let mut failed = 0;
    for (event, result) in events.iter().zip(results) {
        if let Err(e) = result {
            failed += 1;
            error!(user_id = %event.user_id, "Failed to handle event: {:?}", e);
        }
    }

    if failed > 0 {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{} of {} events failed", failed, events.len()),
        ));
    }
    Ok("OK")
}

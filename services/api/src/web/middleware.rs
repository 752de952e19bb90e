//! services/api/src/web/middleware.rs
//!
//! Signature check for the LINE webhook route.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-line-signature";
const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

/// Whether `signature` is the base64 HMAC-SHA256 of `body` under `secret`.
/// The comparison runs in constant time.
pub fn signature_matches(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Middleware that rejects webhook calls whose body was not signed with the channel secret.
///
/// The body is buffered to compute the HMAC and handed on unchanged.
pub async fn verify_line_signature(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = req.into_parts();

    // 1. Extract the signature header
    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    // 2. Buffer the raw body
    let bytes = to_bytes(body, MAX_WEBHOOK_BODY)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    // 3. Verify
    if !signature_matches(state.config.line_channel_secret.as_bytes(), &bytes, &signature) {
        warn!("Rejected webhook call with an invalid signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    // 4. Continue to the handler with the original body
    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}

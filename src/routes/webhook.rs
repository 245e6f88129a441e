// SPDX-License-Identifier: MIT

//! Webhook route for WHOOP events.
//!
//! Intake policy: reject only on signature (401) or parse (400) failure.
//! Everything past that acknowledges with 200 so the provider never
//! retries because of an internal fault - the handler verifies, resolves
//! the user, and enqueues; the sync itself runs on the background worker.

use crate::error::AppError;
use crate::services::jobs::SyncJob;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Signature header sent by WHOOP.
const SIGNATURE_HEADER: &str = "X-WHOOP-Signature";
/// Timestamp the signature was computed over.
const TIMESTAMP_HEADER: &str = "X-WHOOP-Signature-Timestamp";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/whoop", post(handle_event))
}

/// WHOOP webhook event envelope.
#[derive(Deserialize, Debug)]
struct WebhookEvent {
    /// Event type, e.g. "workout.updated", "recovery.updated"
    #[serde(rename = "type")]
    event_type: String,
    /// WHOOP's user ID (resolved to a journal user via the connection)
    user_id: i64,
}

/// Acknowledgement body returned to WHOOP.
#[derive(Serialize)]
struct WebhookAck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl WebhookAck {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok",
            reason: None,
        })
    }

    fn ignored(reason: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "ignored",
            reason: Some(reason.into()),
        })
    }
}

/// Handle incoming webhook events (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    // 1. Signature check over timestamp bytes + raw body
    match &state.config.whoop_webhook_secret {
        Some(secret) => {
            let signature = headers
                .get(SIGNATURE_HEADER)
                .and_then(|h| h.to_str().ok())
                .ok_or(AppError::InvalidSignature)?;
            let timestamp = headers
                .get(TIMESTAMP_HEADER)
                .and_then(|h| h.to_str().ok())
                .ok_or(AppError::InvalidSignature)?;

            if !verify_signature(secret, timestamp, &body, signature) {
                tracing::warn!("Webhook signature mismatch");
                return Err(AppError::InvalidSignature);
            }
        }
        None => {
            tracing::warn!("WHOOP_WEBHOOK_SECRET not set, skipping signature verification");
        }
    }

    // 2. Parse the envelope
    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed webhook body: {}", e)))?;

    tracing::info!(
        event_type = %event.event_type,
        whoop_user_id = event.user_id,
        "Webhook event received"
    );

    // 3. Resolve the external identity; unknown users are acknowledged,
    //    never failed
    let connection = match state
        .db
        .get_active_connection_by_whoop_user(event.user_id)
        .await
    {
        Ok(Some(conn)) => conn,
        Ok(None) => {
            tracing::info!(whoop_user_id = event.user_id, "No active connection for webhook user");
            return Ok(WebhookAck::ignored("no active connection"));
        }
        Err(e) => {
            // Internal fault: acknowledge anyway (never trigger provider retries)
            tracing::error!(error = %e, "Connection lookup failed during webhook");
            return Ok(WebhookAck::ok());
        }
    };

    // 4. Dispatch by event type - enqueue only, the worker does the sync
    let job = match &event.event_type {
        t if t.starts_with("workout.") => SyncJob::Workouts {
            user_id: connection.user_id,
            days_back: 1,
        },
        t if t.starts_with("recovery.") || t.starts_with("sleep.") => SyncJob::Recovery {
            user_id: connection.user_id,
            days_back: 1,
        },
        other => {
            tracing::debug!(event_type = %other, "Ignoring unhandled event type");
            return Ok(WebhookAck::ignored("unhandled event type"));
        }
    };

    // 5. Enqueue failures are logged, never surfaced
    state.sync_queue.enqueue(job);

    Ok(WebhookAck::ok())
}

/// Verify the HMAC-SHA256 signature over `timestamp_bytes + raw_body`,
/// base64-encoded and compared in constant time.
fn verify_signature(secret: &str, timestamp: &str, body: &[u8], provided: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.update(body);
    let expected = BASE64.encode(mac.finalize().into_bytes());

    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

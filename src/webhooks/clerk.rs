//! Clerk identity webhook handler.
//!
//! Receives and verifies user lifecycle events from the identity provider
//! and syncs them into the shared `users` table.
//!
//! Signature verification: events are signed with HMAC-SHA256 over the
//! string `{event_id}.{timestamp}.{raw_body}`, base64-encoded. The signature
//! header may carry several space-separated candidates, each optionally
//! prefixed with a `v1,` version tag (Svix convention); any match passes.

use axum::{extract::State, http::HeaderMap, response::Json};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use crate::error::SyncError;
use crate::store::Store;
use crate::SharedState;

type HmacSha256 = Hmac<Sha256>;

/// Replay protection: reject events older than 5 minutes.
const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

// =============================================================================
// Event Shapes
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct IdentityEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: IdentityEventData,
}

#[derive(Debug, Deserialize)]
pub struct IdentityEventData {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailAddress {
    pub email_address: String,
}

impl IdentityEventData {
    /// Primary email, taken from the first entry as the provider orders them.
    fn primary_email(&self) -> Result<&str, SyncError> {
        self.email_addresses
            .first()
            .map(|e| e.email_address.as_str())
            .ok_or_else(|| SyncError::BadRequest("event data missing email_addresses".into()))
    }

    fn display_name(&self) -> String {
        display_name(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

// =============================================================================
// Signature Verification
// =============================================================================

/// Verify an event signature. Pure function, independent of any HTTP
/// framework, so it is unit-testable on its own.
///
/// Signed payload: `{event_id}.{timestamp}.{raw_body}`, HMAC-SHA256 with the
/// shared secret, base64. Comparison is constant-time.
pub fn verify_event_signature(
    secret: &str,
    event_id: &str,
    timestamp: &str,
    raw_body: &[u8],
    signature_header: &str,
) -> bool {
    let mut signed = Vec::with_capacity(event_id.len() + timestamp.len() + raw_body.len() + 2);
    signed.extend_from_slice(event_id.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(raw_body);

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(&signed);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    signature_header
        .split(' ')
        .filter(|s| !s.is_empty())
        .any(|candidate| {
            let candidate = candidate.strip_prefix("v1,").unwrap_or(candidate);
            constant_time_eq(expected.as_bytes(), candidate.as_bytes())
        })
}

/// Replay protection: the event timestamp (unix seconds) must not be older
/// than the tolerance. An unparseable timestamp never passes.
fn timestamp_fresh(timestamp: &str, now_secs: i64) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    now_secs.saturating_sub(ts) <= TIMESTAMP_TOLERANCE_SECS
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `"{first} {last}"` with absent parts dropped, as the main backend stores it.
fn display_name(first: Option<&str>, last: Option<&str>) -> String {
    format!("{} {}", first.unwrap_or(""), last.unwrap_or(""))
        .trim()
        .to_string()
}

// =============================================================================
// Main Handler
// =============================================================================

/// POST /v1/webhooks/clerk
pub async fn clerk_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, SyncError> {
    let secret = &state.config.clerk_webhook_secret;

    if secret.is_empty() {
        tracing::error!("[Webhook] CLERK_WEBHOOK_SECRET not set — rejecting all events");
        return Err(SyncError::Configuration("webhook secret not configured".into()));
    }

    let event_id = header_str(&headers, "event-id")?;
    let timestamp = header_str(&headers, "event-timestamp")?;
    let signature = header_str(&headers, "event-signature")?;

    if !timestamp_fresh(timestamp, chrono::Utc::now().timestamp()) {
        tracing::warn!("[Webhook:Clerk] stale event ts={timestamp} — rejecting (replay protection)");
        return Err(SyncError::Verification("event timestamp outside tolerance".into()));
    }

    if !verify_event_signature(secret, event_id, timestamp, &body, signature) {
        return Err(SyncError::Verification("signature mismatch".into()));
    }

    let event: IdentityEvent = serde_json::from_slice(&body)
        .map_err(|e| SyncError::BadRequest(format!("invalid event payload: {e}")))?;

    tracing::info!("[Webhook:Clerk] event={} id={event_id}", event.kind);

    match event.kind.as_str() {
        "user.created" => handle_user_created(&state.store, &event.data).await?,
        "user.updated" => handle_user_updated(&state.store, &event.data).await?,
        "user.deleted" => handle_user_deleted(&state.store, &event.data).await?,
        other => {
            // Unrecognized types are acked without any state change.
            tracing::debug!("[Webhook:Clerk] unhandled event type: {other}");
        }
    }

    Ok(Json(json!({ "success": true })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, SyncError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SyncError::Verification(format!("missing {name} header")))
}

// =============================================================================
// Event Handlers
// =============================================================================

/// `user.created` — upsert on the external id, so replayed deliveries and
/// re-activations of soft-deleted users land on the same row instead of
/// colliding on the unique key.
async fn handle_user_created(store: &Store, data: &IdentityEventData) -> Result<(), SyncError> {
    let email = data.primary_email()?;
    let name = data.display_name();

    store.upsert_identity_user(&data.id, email, &name).await?;

    tracing::info!("[Webhook:Clerk] upserted user: {email}");
    Ok(())
}

/// `user.updated` — overwrite profile fields, leave status untouched.
/// An update for an id we have never seen is acked with a warning; the
/// provider does not guarantee delivery order.
async fn handle_user_updated(store: &Store, data: &IdentityEventData) -> Result<(), SyncError> {
    let email = data.primary_email()?;
    let name = data.display_name();

    let affected = store.update_identity_user(&data.id, email, &name).await?;
    if affected == 0 {
        tracing::warn!("[Webhook:Clerk] update for unknown user {} — skipped", data.id);
    } else {
        tracing::info!("[Webhook:Clerk] updated user: {email}");
    }

    Ok(())
}

/// `user.deleted` — soft delete: flip status, keep the row and its profile.
async fn handle_user_deleted(store: &Store, data: &IdentityEventData) -> Result<(), SyncError> {
    let affected = store.soft_delete_identity_user(&data.id).await?;
    if affected == 0 {
        tracing::warn!("[Webhook:Clerk] delete for unknown user {} — skipped", data.id);
    } else {
        tracing::info!("[Webhook:Clerk] soft-deleted user: {}", data.id);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

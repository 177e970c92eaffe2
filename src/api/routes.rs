//! API route handlers for formora-sync.
//!
//! All handlers receive `SharedState` via Axum state extraction. The token
//! and CRM endpoints are for internal service-to-service use only and are
//! gated on the shared service secret.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::SyncError;
use crate::webhooks::clerk;
use crate::SharedState;

// =============================================================================
// V1 Router
// =============================================================================

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── Webhooks ─────────────────────────────────────────────────────
        .route("/webhooks/clerk", post(clerk::clerk_webhook))
        // ── Storage tokens ───────────────────────────────────────────────
        .route("/storage/token/{provider}", get(storage_token))
        // ── CRM ──────────────────────────────────────────────────────────
        .route("/crm/salesforce/sync", post(salesforce_sync))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn status(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "formora-sync",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.registry.ids(),
    }))
}

// =============================================================================
// Internal auth
// =============================================================================

/// Gate an endpoint on the shared service secret.
fn require_internal(state: &SharedState, headers: &HeaderMap) -> Result<(), SyncError> {
    let provided = headers
        .get("x-internal-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let expected = &state.config.service_secret;
    if expected.is_empty() || provided != expected {
        return Err(SyncError::Unauthorized);
    }

    Ok(())
}

// =============================================================================
// Storage tokens
// =============================================================================

/// GET /v1/storage/token/{provider} — hand a currently-valid access token to
/// an internal collaborator (e.g. the upload pipeline in the main backend).
async fn storage_token(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(provider): Path<String>,
) -> Result<Json<serde_json::Value>, SyncError> {
    require_internal(&state, &headers)?;

    let token = state
        .credentials
        .get_valid_access_token(&state.store, &state.registry, &provider)
        .await?;

    Ok(Json(json!({
        "data": {
            "provider": provider,
            "access_token": token,
        }
    })))
}

// =============================================================================
// CRM
// =============================================================================

#[derive(Debug, Deserialize)]
struct SalesforceSyncRequest {
    clerk_user_id: Option<String>,
    name: Option<String>,
    email: Option<String>,
    company_name: Option<String>,
    job_title: Option<String>,
}

/// POST /v1/crm/salesforce/sync — provision a Salesforce Account + Contact
/// for a local user and record the account id on their row.
async fn salesforce_sync(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<SalesforceSyncRequest>,
) -> Result<Json<serde_json::Value>, SyncError> {
    require_internal(&state, &headers)?;

    let salesforce = state
        .salesforce
        .as_ref()
        .ok_or_else(|| SyncError::Configuration("Salesforce credentials not configured".into()))?;

    let (clerk_user_id, name, email, company_name, job_title) = match (
        body.clerk_user_id,
        body.name,
        body.email,
        body.company_name,
        body.job_title,
    ) {
        (Some(a), Some(b), Some(c), Some(d), Some(e)) => (a, b, c, d, e),
        _ => return Err(SyncError::BadRequest("missing required fields".into())),
    };

    let user = state
        .store
        .get_user_by_clerk_id(&clerk_user_id)
        .await?
        .ok_or_else(|| SyncError::NotFound("user".into()))?;

    if user.salesforce_account_id.is_some() {
        return Err(SyncError::BadRequest("already synced with Salesforce".into()));
    }

    let account_id = salesforce
        .provision_contact(&name, &email, &company_name, &job_title)
        .await?;

    state
        .store
        .set_salesforce_account(&clerk_user_id, &account_id)
        .await?;

    tracing::info!("[CRM] synced user {clerk_user_id} to Salesforce account {account_id}");

    Ok(Json(json!({
        "success": true,
        "account_id": account_id,
    })))
}

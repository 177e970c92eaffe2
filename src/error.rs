use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the formora-sync service.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // ── Auth Errors ─────────────────────────────────────────────────────
    #[error("Authentication required")]
    Unauthorized,

    #[error("Webhook verification failed: {0}")]
    Verification(String),

    // ── Resource Errors ─────────────────────────────────────────────────
    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // ── Credential Errors ───────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Provider error: {0}")]
    Provider(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        SyncError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        SyncError::Internal(e.to_string())
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SyncError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            SyncError::Verification(_) => (StatusCode::UNAUTHORIZED, "verification_failed"),
            SyncError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            SyncError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            SyncError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            SyncError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            SyncError::Refresh(_) => (StatusCode::BAD_GATEWAY, "refresh_failed"),
            SyncError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            SyncError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            SyncError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: SyncError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn variants_map_to_expected_statuses() {
        assert_eq!(status_of(SyncError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(SyncError::Verification("bad sig".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(SyncError::BadRequest("already synced with Salesforce".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(SyncError::Configuration("secret missing".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(SyncError::Refresh("provider said no".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(SyncError::NotFound("user".into())),
            StatusCode::NOT_FOUND
        );
    }
}

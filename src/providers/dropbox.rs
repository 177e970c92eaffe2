use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{StorageProvider, TokenSet, TOKEN_REQUEST_TIMEOUT};
use crate::error::SyncError;

const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";

/// Dropbox OAuth 2.0 provider.
///
/// Token lifetime: ~4 hours. The refresh token is long-lived and is not
/// rotated on refresh, so only the access token and expiry ever change.
pub struct DropboxProvider {
    app_key: String,
    app_secret: String,
    http: reqwest::Client,
}

// Raw token response from Dropbox's token endpoint
#[derive(Debug, Deserialize)]
struct DropboxTokenResponse {
    access_token: String,
    expires_in: u64,
}

impl DropboxProvider {
    pub fn new(app_key: String, app_secret: String) -> Self {
        Self {
            app_key,
            app_secret,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StorageProvider for DropboxProvider {
    fn id(&self) -> &str {
        "dropbox"
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, SyncError> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .basic_auth(&self.app_key, Some(&self.app_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Refresh(format!("Dropbox refresh request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Refresh(format!("Dropbox refresh failed: {body}")));
        }

        let token_resp: DropboxTokenResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::Refresh(format!("Failed to parse refresh response: {e}")))?;

        Ok(TokenSet {
            access_token: token_resp.access_token,
            refresh_token: None,
            expires_in: Some(token_resp.expires_in),
        })
    }
}

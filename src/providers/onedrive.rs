use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{StorageProvider, TokenSet, TOKEN_REQUEST_TIMEOUT};
use crate::error::SyncError;

const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const SCOPE: &str = "Files.ReadWrite offline_access";

/// Microsoft OneDrive OAuth 2.0 provider.
///
/// Rotates the refresh token on every refresh, and supports a one-time
/// authorization-code exchange for first-boot provisioning (the credential
/// row is seeded without tokens; the first caller performs the exchange).
pub struct OneDriveProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    auth_code: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OneDriveTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl OneDriveProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: Option<String>,
        auth_code: Option<String>,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            auth_code,
            http: reqwest::Client::new(),
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, SyncError> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .form(form)
            .send()
            .await
            .map_err(|e| SyncError::Refresh(format!("OneDrive token request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Refresh(format!("OneDrive token request failed: {body}")));
        }

        let token_resp: OneDriveTokenResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::Refresh(format!("Failed to parse token response: {e}")))?;

        Ok(TokenSet {
            access_token: squash(&token_resp.access_token),
            refresh_token: token_resp.refresh_token.as_deref().map(squash),
            expires_in: token_resp.expires_in,
        })
    }
}

#[async_trait]
impl StorageProvider for OneDriveProvider {
    fn id(&self) -> &str {
        "onedrive"
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, SyncError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("scope", SCOPE),
        ])
        .await
    }

    async fn exchange_code(&self) -> Result<TokenSet, SyncError> {
        let code = self.auth_code.as_deref().ok_or_else(|| {
            SyncError::Configuration("ONEDRIVE_AUTH_CODE not set; cannot bootstrap tokens".into())
        })?;
        let redirect_uri = self.redirect_uri.as_deref().ok_or_else(|| {
            SyncError::Configuration("ONEDRIVE_REDIRECT_URI not set; cannot bootstrap tokens".into())
        })?;

        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("scope", SCOPE),
        ])
        .await
    }
}

/// Microsoft occasionally wraps long tokens with whitespace; strip it before
/// the token goes anywhere near an Authorization header.
fn squash(s: &str) -> String {
    s.split_whitespace().collect()
}

use async_trait::async_trait;
use std::time::Duration;

use crate::error::SyncError;

/// Outbound token-endpoint calls must not hold a caller open indefinitely.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens returned from a provider's token endpoint after refresh or exchange.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    /// Some providers rotate the refresh token on every refresh; `None`
    /// means "keep the stored one".
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Trait that every storage provider must implement.
///
/// Each implementation handles the provider-specific quirks of its token
/// endpoint (auth style, form shape, refresh-token rotation).
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Unique provider identifier (e.g., "dropbox", "onedrive").
    fn id(&self) -> &str;

    /// Mint a new access token from a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, SyncError>;

    /// One-time authorization-code exchange for providers that are
    /// provisioned without a refresh token. Most providers don't need this.
    async fn exchange_code(&self) -> Result<TokenSet, SyncError> {
        Err(SyncError::Provider(format!(
            "{} does not support code exchange",
            self.id()
        )))
    }
}

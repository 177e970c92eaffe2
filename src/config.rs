use anyhow::{Context, Result};

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,

    // ── Database (PostgreSQL, shared with the Formora backend) ──────────
    pub database_url: String,

    // ── Service-to-service auth ─────────────────────────────────────────
    /// Shared secret for internal callers of the token and CRM endpoints.
    pub service_secret: String,

    // ── Clerk ───────────────────────────────────────────────────────────
    /// Signing secret for inbound identity webhooks. Left empty when unset;
    /// the webhook handler rejects all events until it is configured.
    pub clerk_webhook_secret: String,

    // ── Dropbox ─────────────────────────────────────────────────────────
    pub dropbox_app_key: Option<String>,
    pub dropbox_app_secret: Option<String>,
    /// Long-lived refresh token used to seed the credential row on first boot.
    pub dropbox_seed_refresh_token: Option<String>,

    // ── OneDrive ────────────────────────────────────────────────────────
    pub onedrive_client_id: Option<String>,
    pub onedrive_client_secret: Option<String>,
    pub onedrive_redirect_uri: Option<String>,
    /// One-shot authorization code, consumed by the first token exchange.
    pub onedrive_auth_code: Option<String>,

    // ── Salesforce ──────────────────────────────────────────────────────
    pub salesforce_client_id: Option<String>,
    pub salesforce_client_secret: Option<String>,
    pub salesforce_username: Option<String>,
    pub salesforce_password: Option<String>,
    pub salesforce_security_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8430".into())
                .parse()
                .context("Invalid PORT")?,

            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL is required (PostgreSQL connection string)")?,

            service_secret: std::env::var("SYNC_SERVICE_SECRET")
                .context("SYNC_SERVICE_SECRET is required for service-to-service auth")?,

            clerk_webhook_secret: std::env::var("CLERK_WEBHOOK_SECRET").unwrap_or_default(),

            dropbox_app_key: std::env::var("DROPBOX_APP_KEY").ok(),
            dropbox_app_secret: std::env::var("DROPBOX_APP_SECRET").ok(),
            dropbox_seed_refresh_token: std::env::var("DROPBOX_SEED_REFRESH_TOKEN").ok(),

            onedrive_client_id: std::env::var("ONEDRIVE_CLIENT_ID").ok(),
            onedrive_client_secret: std::env::var("ONEDRIVE_CLIENT_SECRET").ok(),
            onedrive_redirect_uri: std::env::var("ONEDRIVE_REDIRECT_URI").ok(),
            onedrive_auth_code: std::env::var("ONEDRIVE_AUTH_CODE").ok(),

            salesforce_client_id: std::env::var("SALESFORCE_CLIENT_ID").ok(),
            salesforce_client_secret: std::env::var("SALESFORCE_CLIENT_SECRET").ok(),
            salesforce_username: std::env::var("SALESFORCE_USERNAME").ok(),
            salesforce_password: std::env::var("SALESFORCE_PASSWORD").ok(),
            salesforce_security_token: std::env::var("SALESFORCE_SECURITY_TOKEN").ok(),
        })
    }
}

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use formora_sync::{
    api,
    config::Config,
    credentials::CredentialManager,
    crm::SalesforceClient,
    providers::{self, ProviderRegistry},
    store::Store,
    AppState, SharedState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formora_sync=info".into()),
        )
        .init();

    // Load config
    let config = Config::from_env()?;
    info!("formora-sync v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    // Initialize components
    let store = Store::new(&config.database_url).await?;
    store.migrate().await?;
    info!("Database connected and migrated ✓");

    let mut registry = ProviderRegistry::new();
    providers::register_defaults(&mut registry, &config);
    info!("Registered {} storage providers", registry.count());

    seed_credentials(&store, &config).await?;

    let salesforce = SalesforceClient::from_config(&config);
    if salesforce.is_some() {
        info!("Salesforce CRM sync enabled");
    }

    // Build shared state
    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        store,
        credentials: CredentialManager::new(),
        registry,
        salesforce,
    });

    // Build router
    let app = api::router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Provision credential rows on first boot. Seeded rows expire immediately,
/// so the first token request performs the initial refresh (Dropbox) or
/// authorization-code exchange (OneDrive).
async fn seed_credentials(store: &Store, config: &Config) -> Result<()> {
    if let Some(refresh_token) = &config.dropbox_seed_refresh_token {
        if store.seed_credential("dropbox", "", refresh_token).await? {
            info!("Seeded dropbox credential from environment");
        }
    }

    if config.onedrive_auth_code.is_some() {
        if store.seed_credential("onedrive", "", "").await? {
            info!("Seeded onedrive credential (pending code exchange)");
        }
    }

    Ok(())
}

pub mod api;
pub mod config;
pub mod credentials;
pub mod crm;
pub mod error;
pub mod providers;
pub mod store;
pub mod webhooks;

pub use config::Config;
pub use error::SyncError;

use std::sync::Arc;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub store: store::Store,
    pub credentials: credentials::CredentialManager,
    pub registry: providers::ProviderRegistry,
    /// Present only when Salesforce credentials are configured.
    pub salesforce: Option<crm::SalesforceClient>,
}

pub type SharedState = Arc<AppState>;

mod dropbox;
mod onedrive;
mod registry;
mod traits;

pub use dropbox::DropboxProvider;
pub use onedrive::OneDriveProvider;
pub use registry::ProviderRegistry;
pub use traits::{StorageProvider, TokenSet, TOKEN_REQUEST_TIMEOUT};

use crate::config::Config;

/// Register all storage providers that have credentials configured.
pub fn register_defaults(registry: &mut ProviderRegistry, config: &Config) {
    // Dropbox
    if let (Some(key), Some(secret)) = (&config.dropbox_app_key, &config.dropbox_app_secret) {
        registry.register(Box::new(DropboxProvider::new(key.clone(), secret.clone())));
    }

    // OneDrive
    if let (Some(id), Some(secret)) = (&config.onedrive_client_id, &config.onedrive_client_secret) {
        registry.register(Box::new(OneDriveProvider::new(
            id.clone(),
            secret.clone(),
            config.onedrive_redirect_uri.clone(),
            config.onedrive_auth_code.clone(),
        )));
    }
}

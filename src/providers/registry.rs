use super::traits::StorageProvider;

/// The storage providers this deployment holds credentials for.
///
/// Populated once at boot from config and never mutated afterwards; the set
/// is tiny (Dropbox, OneDrive), so lookups are a linear scan over ids.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn StorageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn register(&mut self, provider: Box<dyn StorageProvider>) {
        self.providers.push(provider);
    }

    /// Look up a provider by id (e.g. "dropbox").
    pub fn get(&self, id: &str) -> Option<&dyn StorageProvider> {
        self.providers
            .iter()
            .find(|p| p.id() == id)
            .map(|p| p.as_ref())
    }

    /// Ids available for token handout; surfaced on the status endpoint.
    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn count(&self) -> usize {
        self.providers.len()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::providers::TokenSet;
    use async_trait::async_trait;

    struct StubProvider(&'static str);

    #[async_trait]
    impl StorageProvider for StubProvider {
        fn id(&self) -> &str {
            self.0
        }

        async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, SyncError> {
            Err(SyncError::Provider("stub".into()))
        }
    }

    #[test]
    fn lookup_and_listing_follow_registration() {
        let mut registry = ProviderRegistry::new();
        assert_eq!(registry.count(), 0);
        assert!(registry.get("dropbox").is_none());

        registry.register(Box::new(StubProvider("dropbox")));
        registry.register(Box::new(StubProvider("onedrive")));

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get("dropbox").map(|p| p.id()), Some("dropbox"));
        assert!(registry.get("gdrive").is_none());
        assert_eq!(registry.ids(), vec!["dropbox", "onedrive"]);
    }
}

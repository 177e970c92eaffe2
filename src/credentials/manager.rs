//! Lazy, on-demand refresh of storage provider credentials.
//!
//! Each provider owns a single credential row. Callers ask for a valid
//! access token; the manager serves the stored token while it is fresh and
//! refreshes it through the provider's token endpoint once it enters the
//! expiry skew window. Refreshes are single-flighted per provider, and the
//! durable write is a compare-and-swap on the previously-read expiry so
//! racing refreshers in other processes cannot clobber each other.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::providers::ProviderRegistry;
use crate::store::{CredentialRecord, Store};

/// Safety margin against clock drift and in-flight request latency: a token
/// within this window of its expiry is treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Used when a provider's token response omits `expires_in`.
const DEFAULT_TTL_SECS: u64 = 3600;

/// The single-row credential primitives the manager needs from the durable
/// store. `Store` is the production implementation; tests substitute an
/// in-memory one.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(&self, provider: &str) -> Result<Option<CredentialRecord>, SyncError>;

    /// Persist refreshed tokens, conditioned on the expiry the caller read.
    /// Returns false when the row's expiry no longer matches.
    async fn update_credential(
        &self,
        provider: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
        prev_expires_at: DateTime<Utc>,
    ) -> Result<bool, SyncError>;
}

#[async_trait]
impl CredentialStore for Store {
    async fn get_credential(&self, provider: &str) -> Result<Option<CredentialRecord>, SyncError> {
        Store::get_credential(self, provider).await
    }

    async fn update_credential(
        &self,
        provider: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
        prev_expires_at: DateTime<Utc>,
    ) -> Result<bool, SyncError> {
        Store::update_credential(
            self,
            provider,
            access_token,
            refresh_token,
            expires_at,
            prev_expires_at,
        )
        .await
    }
}

/// Serves valid access tokens, refreshing lazily on expiry.
pub struct CredentialManager {
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialManager {
    pub fn new() -> Self {
        Self {
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get a currently-valid access token for a provider, refreshing first
    /// if the stored one is inside the skew window. The fast path issues no
    /// network call and no write.
    pub async fn get_valid_access_token(
        &self,
        store: &dyn CredentialStore,
        registry: &ProviderRegistry,
        provider_id: &str,
    ) -> Result<String, SyncError> {
        let provider = registry
            .get(provider_id)
            .ok_or_else(|| SyncError::NotFound(format!("provider {provider_id}")))?;

        let record = read_credential(store, provider_id).await?;
        if !needs_refresh(Utc::now(), record.expires_at) {
            return Ok(record.access_token);
        }

        let lock = self.refresh_lock(provider_id).await;
        let _guard = lock.lock().await;

        // Re-check under the lock: a caller we queued behind may have
        // already refreshed.
        let record = read_credential(store, provider_id).await?;
        if !needs_refresh(Utc::now(), record.expires_at) {
            return Ok(record.access_token);
        }

        let tokens = if record.refresh_token.is_empty() {
            // Freshly-seeded row with no tokens yet (OneDrive bootstrap).
            provider.exchange_code().await?
        } else {
            provider.refresh_token(&record.refresh_token).await?
        };

        let now = Utc::now();
        let ttl = tokens.expires_in.unwrap_or(DEFAULT_TTL_SECS);
        let expires_at = now + Duration::seconds(ttl as i64);

        let swapped = store
            .update_credential(
                provider_id,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
                expires_at,
                record.expires_at,
            )
            .await?;

        if !swapped {
            // A refresher in another process won the swap; serve its token.
            warn!("Lost credential swap for {provider_id}; using the winning refresh");
            let current = read_credential(store, provider_id).await?;
            return Ok(current.access_token);
        }

        info!("Refreshed {provider_id} credential, valid until {expires_at}");
        Ok(tokens.access_token)
    }

    async fn refresh_lock(&self, provider_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(provider_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for CredentialManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_credential(
    store: &dyn CredentialStore,
    provider_id: &str,
) -> Result<CredentialRecord, SyncError> {
    store
        .get_credential(provider_id)
        .await?
        .ok_or_else(|| SyncError::Configuration(format!("no {provider_id} credential provisioned")))
}

/// A token is due for refresh once `now` reaches the skew window before
/// its expiry.
fn needs_refresh(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
    now >= expires_at - Duration::seconds(EXPIRY_SKEW_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{StorageProvider, TokenSet};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn fresh_token_is_served_without_refresh() {
        // Expiry comfortably beyond the skew window.
        assert!(!needs_refresh(at(1_000), at(1_000 + 61)));
        assert!(!needs_refresh(at(1_000), at(5_000)));
    }

    #[test]
    fn token_inside_skew_window_is_refreshed() {
        assert!(needs_refresh(at(1_000), at(1_000 + 60)));
        assert!(needs_refresh(at(1_000), at(1_000 + 30)));
    }

    #[test]
    fn expired_token_is_refreshed() {
        assert!(needs_refresh(at(1_000), at(1_000)));
        assert!(needs_refresh(at(1_000), at(500)));
    }

    // ── Manager flow, against an in-memory store and a counting provider ──

    struct FakeProvider {
        refresh_calls: Arc<AtomicUsize>,
        exchange_calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl StorageProvider for FakeProvider {
        fn id(&self) -> &str {
            "fake"
        }

        async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, SyncError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SyncError::Refresh("token endpoint said no".into()));
            }
            Ok(TokenSet {
                access_token: "fresh-token".into(),
                refresh_token: None,
                expires_in: Some(3600),
            })
        }

        async fn exchange_code(&self) -> Result<TokenSet, SyncError> {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            Ok(TokenSet {
                access_token: "exchanged-token".into(),
                refresh_token: Some("minted-rt".into()),
                expires_in: Some(3600),
            })
        }
    }

    struct MemoryStore {
        record: StdMutex<Option<CredentialRecord>>,
        writes: AtomicUsize,
        reject_swap: bool,
    }

    impl MemoryStore {
        fn with_record(record: CredentialRecord) -> Self {
            Self {
                record: StdMutex::new(Some(record)),
                writes: AtomicUsize::new(0),
                reject_swap: false,
            }
        }

        fn empty() -> Self {
            Self {
                record: StdMutex::new(None),
                writes: AtomicUsize::new(0),
                reject_swap: false,
            }
        }

        fn current(&self) -> Option<CredentialRecord> {
            self.record.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn get_credential(
            &self,
            _provider: &str,
        ) -> Result<Option<CredentialRecord>, SyncError> {
            Ok(self.current())
        }

        async fn update_credential(
            &self,
            _provider: &str,
            access_token: &str,
            refresh_token: Option<&str>,
            expires_at: DateTime<Utc>,
            prev_expires_at: DateTime<Utc>,
        ) -> Result<bool, SyncError> {
            if self.reject_swap {
                return Ok(false);
            }
            let mut record = self.record.lock().unwrap();
            match record.as_mut() {
                Some(r) if r.expires_at == prev_expires_at => {
                    r.access_token = access_token.to_string();
                    if let Some(rt) = refresh_token {
                        r.refresh_token = rt.to_string();
                    }
                    r.expires_at = expires_at;
                    self.writes.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    fn record(access: &str, refresh: &str, expires_at: DateTime<Utc>) -> CredentialRecord {
        CredentialRecord {
            access_token: access.into(),
            refresh_token: refresh.into(),
            expires_at,
        }
    }

    fn fixture(fail: bool) -> (ProviderRegistry, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let exchange_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(FakeProvider {
            refresh_calls: refresh_calls.clone(),
            exchange_calls: exchange_calls.clone(),
            fail,
        }));
        (registry, refresh_calls, exchange_calls)
    }

    #[tokio::test]
    async fn fast_path_issues_no_provider_call_and_no_write() {
        let (registry, refresh_calls, _) = fixture(false);
        let store = MemoryStore::with_record(record(
            "stored-token",
            "rt",
            Utc::now() + Duration::seconds(3_600),
        ));
        let manager = CredentialManager::new();

        let token = manager
            .get_valid_access_token(&store, &registry, "fake")
            .await
            .unwrap();

        assert_eq!(token, "stored-token");
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_triggers_exactly_one_refresh_and_persists_expiry() {
        let (registry, refresh_calls, _) = fixture(false);
        let store = MemoryStore::with_record(record("old-token", "rt", Utc::now()));
        let manager = CredentialManager::new();

        let token = manager
            .get_valid_access_token(&store, &registry, "fake")
            .await
            .unwrap();

        assert_eq!(token, "fresh-token");
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);

        let stored = store.current().unwrap();
        assert_eq!(stored.access_token, "fresh-token");
        // expires_in = 3600 was applied from now at refresh time
        assert!(stored.expires_at > Utc::now() + Duration::seconds(3_000));
        // refresh token was not rotated, so the stored one is kept
        assert_eq!(stored.refresh_token, "rt");
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_error_and_leaves_record_untouched() {
        let (registry, refresh_calls, _) = fixture(true);
        let seeded = record("old-token", "rt", Utc::now());
        let store = MemoryStore::with_record(seeded.clone());
        let manager = CredentialManager::new();

        let err = manager
            .get_valid_access_token(&store, &registry, "fake")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Refresh(_)));
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);

        let stored = store.current().unwrap();
        assert_eq!(stored.access_token, seeded.access_token);
        assert_eq!(stored.refresh_token, seeded.refresh_token);
        assert_eq!(stored.expires_at, seeded.expires_at);
    }

    #[tokio::test]
    async fn missing_credential_is_a_configuration_error() {
        let (registry, refresh_calls, _) = fixture(false);
        let store = MemoryStore::empty();
        let manager = CredentialManager::new();

        let err = manager
            .get_valid_access_token(&store, &registry, "fake")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Configuration(_)));
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let (registry, _, _) = fixture(false);
        let store = MemoryStore::empty();
        let manager = CredentialManager::new();

        let err = manager
            .get_valid_access_token(&store, &registry, "gdrive")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn lost_swap_serves_the_winning_token() {
        let (registry, refresh_calls, _) = fixture(false);
        let mut store = MemoryStore::with_record(record("winner-token", "rt", Utc::now()));
        store.reject_swap = true;
        let manager = CredentialManager::new();

        let token = manager
            .get_valid_access_token(&store, &registry, "fake")
            .await
            .unwrap();

        // The refresh ran, but the conditional write lost; the caller gets
        // whatever is durably stored, unmodified.
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(token, "winner-token");
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_refresh_token_bootstraps_via_code_exchange() {
        let (registry, refresh_calls, exchange_calls) = fixture(false);
        let store = MemoryStore::with_record(record("", "", Utc::now()));
        let manager = CredentialManager::new();

        let token = manager
            .get_valid_access_token(&store, &registry, "fake")
            .await
            .unwrap();

        assert_eq!(token, "exchanged-token");
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(exchange_calls.load(Ordering::SeqCst), 1);

        // The minted refresh token is persisted for future refreshes.
        let stored = store.current().unwrap();
        assert_eq!(stored.refresh_token, "minted-rt");
    }
}

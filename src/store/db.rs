//! PostgreSQL-backed store for storage credentials and identity-synced users.
//!
//! Tables:
//! - `storage_credentials`: one row per third-party storage provider
//! - `users`: local user records keyed by the identity provider's id

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Store backed by PostgreSQL.
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self, SyncError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .connect(db_url)
            .await
            .map_err(|e| SyncError::Database(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self { pool })
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), SyncError> {
        // Storage credentials: one row per provider, mutated in place by the
        // refresh flow, never deleted.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS storage_credentials (
                id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                provider        TEXT NOT NULL UNIQUE,
                access_token    TEXT NOT NULL,
                refresh_token   TEXT NOT NULL,
                expires_at      TIMESTAMPTZ NOT NULL,
                created_at      TIMESTAMPTZ DEFAULT NOW(),
                updated_at      TIMESTAMPTZ DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Users synced from the identity provider. Deletion is a status
        // transition, so rows only ever accumulate.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id                    UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                clerk_id              TEXT NOT NULL UNIQUE,
                email                 TEXT NOT NULL,
                name                  TEXT NOT NULL DEFAULT '',
                status                TEXT NOT NULL DEFAULT 'ACTIVE',
                salesforce_account_id TEXT,
                created_at            TIMESTAMPTZ DEFAULT NOW(),
                updated_at            TIMESTAMPTZ DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Storage credentials
    // =========================================================================

    /// Fetch the sole credential row for a provider.
    pub async fn get_credential(
        &self,
        provider: &str,
    ) -> Result<Option<CredentialRecord>, SyncError> {
        let row = sqlx::query(
            r#"
            SELECT access_token, refresh_token, expires_at
            FROM storage_credentials
            WHERE provider = $1
            "#,
        )
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CredentialRecord {
            access_token: r.get(0),
            refresh_token: r.get(1),
            expires_at: r.get(2),
        }))
    }

    /// Seed a credential row at provisioning time. No-op if the provider is
    /// already provisioned. Seeds expire immediately so the first caller
    /// triggers a refresh (or code exchange). Returns whether a row was written.
    pub async fn seed_credential(
        &self,
        provider: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<bool, SyncError> {
        let affected = sqlx::query(
            r#"
            INSERT INTO storage_credentials (provider, access_token, refresh_token, expires_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (provider) DO NOTHING
            "#,
        )
        .bind(provider)
        .bind(access_token)
        .bind(refresh_token)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    /// Persist refreshed tokens, conditioned on the expiry the caller read.
    /// Returns false when a concurrent refresher already moved `expires_at`,
    /// in which case nothing is written.
    pub async fn update_credential(
        &self,
        provider: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
        prev_expires_at: DateTime<Utc>,
    ) -> Result<bool, SyncError> {
        let affected = sqlx::query(
            r#"
            UPDATE storage_credentials
            SET access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                expires_at = $4,
                updated_at = NOW()
            WHERE provider = $1 AND expires_at = $5
            "#,
        )
        .bind(provider)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(prev_expires_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn get_user_by_clerk_id(
        &self,
        clerk_id: &str,
    ) -> Result<Option<UserRecord>, SyncError> {
        let row = sqlx::query(
            r#"
            SELECT id, clerk_id, email, name, status, salesforce_account_id,
                   created_at, updated_at
            FROM users
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let status: String = r.get(4);
            UserRecord {
                id: r.get(0),
                clerk_id: r.get(1),
                email: r.get(2),
                name: r.get(3),
                status: UserStatus::from_db(&status),
                salesforce_account_id: r.try_get(5).ok(),
                created_at: r.get(6),
                updated_at: r.get(7),
            }
        }))
    }

    /// Upsert a user from a verified identity event. The external id is the
    /// natural idempotency key, so replayed `user.created` deliveries (and
    /// re-activations of soft-deleted users) land on the same row.
    pub async fn upsert_identity_user(
        &self,
        clerk_id: &str,
        email: &str,
        name: &str,
    ) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO users (clerk_id, email, name, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (clerk_id) DO UPDATE SET
                email      = EXCLUDED.email,
                name       = EXCLUDED.name,
                status     = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(clerk_id)
        .bind(email)
        .bind(name)
        .bind(UserStatus::Active.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrite profile fields from a verified `user.updated` event.
    /// Returns the number of rows touched; zero means the id is absent.
    pub async fn update_identity_user(
        &self,
        clerk_id: &str,
        email: &str,
        name: &str,
    ) -> Result<u64, SyncError> {
        let affected = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, name = $3, updated_at = NOW()
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .bind(email)
        .bind(name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }

    /// Soft-delete a user: flips status, keeps the row and profile fields.
    pub async fn soft_delete_identity_user(&self, clerk_id: &str) -> Result<u64, SyncError> {
        let affected = sqlx::query(
            r#"
            UPDATE users
            SET status = $2, updated_at = NOW()
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .bind(UserStatus::Deleted.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }

    /// Record the Salesforce account id created by the CRM sync.
    pub async fn set_salesforce_account(
        &self,
        clerk_id: &str,
        account_id: &str,
    ) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            UPDATE users
            SET salesforce_account_id = $2, updated_at = NOW()
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Deleted,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Deleted => "DELETED",
        }
    }

    fn from_db(s: &str) -> Self {
        if s == "DELETED" {
            UserStatus::Deleted
        } else {
            UserStatus::Active
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub clerk_id: String,
    pub email: String,
    pub name: String,
    pub status: UserStatus,
    pub salesforce_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_strings() {
        assert_eq!(UserStatus::from_db("ACTIVE"), UserStatus::Active);
        assert_eq!(UserStatus::from_db("DELETED"), UserStatus::Deleted);
        assert_eq!(UserStatus::Active.as_str(), "ACTIVE");
        assert_eq!(UserStatus::Deleted.as_str(), "DELETED");
    }

    #[test]
    fn unknown_status_defaults_to_active() {
        assert_eq!(UserStatus::from_db(""), UserStatus::Active);
    }
}

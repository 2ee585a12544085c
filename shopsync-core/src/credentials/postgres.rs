use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use super::store::{CredentialStore, SyncFlagStore};
use super::{ShopCredential, SyncTarget};
use crate::error::{Error, Result};

/// PostgreSQL-backed credential store over `shop_credentials` and
/// `shop_sync_settings`.
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn list_expiring_soon(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
        max_staleness: Duration,
        limit: i64,
    ) -> Result<Vec<ShopCredential>> {
        let upper = (now + lookahead).timestamp_millis();
        let lower = (now - max_staleness).timestamp_millis();

        let rows = sqlx::query_as::<_, ShopCredential>(
            r#"
            SELECT
                shop_id, access_token, refresh_token, expires_at,
                partner_id, partner_secret, token_updated_at
            FROM shop_credentials
            WHERE expires_at < $1
              AND expires_at > $2
              AND partner_id IS NOT NULL
              AND partner_secret IS NOT NULL
            ORDER BY expires_at ASC
            LIMIT $3
            "#,
        )
        .bind(upper)
        .bind(lower)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    async fn apply_renewal(
        &self,
        shop_id: i64,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE shop_credentials
            SET access_token = $2,
                refresh_token = $3,
                expires_at = $4,
                token_updated_at = NOW()
            WHERE shop_id = $1
            "#,
        )
        .bind(shop_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ShopGone(shop_id));
        }

        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        shop_id: i64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        // Conditional claim: the UPDATE only lands when no live lease exists,
        // so two overlapping runs cannot both renew the same shop.
        let result = sqlx::query(
            r#"
            UPDATE shop_credentials
            SET lease_until = $2
            WHERE shop_id = $1
              AND (lease_until IS NULL OR lease_until < $3)
            "#,
        )
        .bind(shop_id)
        .bind(now + ttl)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_lease(&self, shop_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE shop_credentials
            SET lease_until = NULL
            WHERE shop_id = $1
            "#,
        )
        .bind(shop_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SyncFlagStore for PostgresCredentialStore {
    async fn list_auto_sync_shops(&self, limit: i64) -> Result<Vec<SyncTarget>> {
        let rows = sqlx::query_as::<_, SyncTarget>(
            r#"
            SELECT shop_id, user_id
            FROM shop_sync_settings
            WHERE auto_sync_enabled = TRUE
            ORDER BY shop_id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}

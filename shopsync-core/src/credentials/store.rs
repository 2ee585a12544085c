use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{ShopCredential, SyncTarget};
use crate::error::Result;

/// Persistence port for per-shop credential state.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Shops whose access token expires within `lookahead` of `now`,
    /// excluding rows expired longer than `max_staleness` ago (a token that
    /// stale is presumed abandoned and needs operator re-delegation) and rows
    /// without both partner fields. Ordered soonest-expiring first, capped at
    /// `limit`.
    async fn list_expiring_soon(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
        max_staleness: Duration,
        limit: i64,
    ) -> Result<Vec<ShopCredential>>;

    /// Atomically store a renewed token pair, advancing `token_updated_at`.
    /// Fails with [`crate::Error::ShopGone`] when the row no longer exists;
    /// callers treat that as recoverable, not fatal to the run.
    async fn apply_renewal(
        &self,
        shop_id: i64,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> Result<()>;

    /// Claim the short-lived renewal lease for a shop. Returns `false` when
    /// another run currently holds it. A lease that is never released lapses
    /// after `ttl`.
    async fn try_acquire_lease(
        &self,
        shop_id: i64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool>;

    /// Release a held renewal lease.
    async fn release_lease(&self, shop_id: i64) -> Result<()>;
}

/// Port over the sync-flagging table.
#[async_trait]
pub trait SyncFlagStore: Send + Sync {
    /// Shops enabled for automatic periodic sync, capped at `limit`.
    async fn list_auto_sync_shops(&self, limit: i64) -> Result<Vec<SyncTarget>>;
}

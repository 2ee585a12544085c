//! Per-shop credential state and its persistence ports.

mod postgres;
mod store;

pub use postgres::PostgresCredentialStore;
pub use store::{CredentialStore, SyncFlagStore};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One row per shop that has delegated API access. Rows are created when the
/// delegation is first established and deleted when it is revoked, both
/// outside this crate; the core only reads a bounded window of rows and
/// updates the token fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShopCredential {
    pub shop_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry of `access_token`, milliseconds since epoch.
    /// Strictly increases on every successful renewal.
    pub expires_at: i64,
    /// Shop-specific partner credentials; a deployment-wide default applies
    /// when absent.
    pub partner_id: Option<i64>,
    pub partner_secret: Option<String>,
    /// Timestamp of the last successful renewal, for audit.
    pub token_updated_at: Option<DateTime<Utc>>,
}

/// A shop flagged for automatic periodic data sync.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncTarget {
    pub shop_id: i64,
    pub user_id: Uuid,
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::credentials::{CredentialStore, ShopCredential};
use crate::error::Result;
use crate::platform::{PlatformApi, RefreshReply};

use super::{FailureKind, Pacer, RefreshOutcome, RefreshPolicy};

/// Deployment-wide partner credentials used when a shop row carries none of
/// its own.
#[derive(Debug, Clone, Default)]
pub struct PartnerDefaults {
    pub partner_id: Option<i64>,
    pub partner_secret: Option<String>,
}

/// Aggregated result of one refresh pass.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshLedger {
    pub total: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub results: Vec<RefreshOutcome>,
}

impl RefreshLedger {
    fn empty() -> Self {
        Self {
            total: 0,
            refreshed: 0,
            failed: 0,
            results: Vec::new(),
        }
    }

    fn from_results(results: Vec<RefreshOutcome>) -> Self {
        let refreshed = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            refreshed,
            failed: results.len() - refreshed,
            results,
        }
    }
}

/// Selects shops nearing token expiry and renews them one by one.
///
/// Work is strictly sequential: the platform rate-limits per partner, so
/// pacing must be deterministic and inter-call. A failure for one shop never
/// blocks the remaining candidates; only a failed candidate query aborts the
/// pass.
pub struct RefreshOrchestrator {
    store: Arc<dyn CredentialStore>,
    platform: Arc<dyn PlatformApi>,
    defaults: PartnerDefaults,
    policy: RefreshPolicy,
}

impl std::fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RefreshOrchestrator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        platform: Arc<dyn PlatformApi>,
        defaults: PartnerDefaults,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            store,
            platform,
            defaults,
            policy,
        }
    }

    /// One refresh pass over the expiring-soon window at `now`.
    pub async fn run(&self, now: DateTime<Utc>, pacer: &mut Pacer) -> Result<RefreshLedger> {
        let candidates = self
            .store
            .list_expiring_soon(
                now,
                self.policy.lookahead,
                self.policy.max_staleness,
                self.policy.batch_size,
            )
            .await?;

        if candidates.is_empty() {
            info!("no shops need token refresh");
            return Ok(RefreshLedger::empty());
        }

        info!(count = candidates.len(), "refreshing shop tokens");

        let mut results = Vec::with_capacity(candidates.len());
        for shop in &candidates {
            pacer.admit().await;
            results.push(self.refresh_shop(shop, now).await);
        }

        let ledger = RefreshLedger::from_results(results);
        info!(
            refreshed = ledger.refreshed,
            failed = ledger.failed,
            "token refresh pass completed"
        );
        Ok(ledger)
    }

    async fn refresh_shop(&self, shop: &ShopCredential, now: DateTime<Utc>) -> RefreshOutcome {
        let Some((partner_id, secret)) = self.resolve_partner(shop) else {
            warn!(shop_id = shop.shop_id, "skipping shop without partner credentials");
            return RefreshOutcome::failed(
                shop.shop_id,
                FailureKind::MissingCredentials,
                "missing partner credentials",
            );
        };

        match self
            .store
            .try_acquire_lease(shop.shop_id, now, self.policy.lease_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(shop_id = shop.shop_id, "renewal lease held by another run");
                return RefreshOutcome::failed(
                    shop.shop_id,
                    FailureKind::LeaseHeld,
                    "renewal lease held by another run",
                );
            }
            Err(err) => {
                warn!(shop_id = shop.shop_id, error = %err, "lease claim failed");
                return RefreshOutcome::failed(
                    shop.shop_id,
                    FailureKind::Transport,
                    format!("lease claim failed: {err}"),
                );
            }
        }

        let outcome = self.renew_leased(shop, partner_id, &secret, now).await;

        if let Err(err) = self.store.release_lease(shop.shop_id).await {
            // The lease lapses on its own after the TTL.
            warn!(shop_id = shop.shop_id, error = %err, "failed to release renewal lease");
        }

        outcome
    }

    async fn renew_leased(
        &self,
        shop: &ShopCredential,
        partner_id: i64,
        secret: &str,
        now: DateTime<Utc>,
    ) -> RefreshOutcome {
        let reply = match self
            .platform
            .refresh(partner_id, secret, &shop.refresh_token, shop.shop_id)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(shop_id = shop.shop_id, error = %err, "platform unreachable");
                return RefreshOutcome::failed(shop.shop_id, FailureKind::Transport, err.to_string());
            }
        };

        let granted = match reply {
            RefreshReply::Granted(granted) => granted,
            RefreshReply::Denied { message } => {
                warn!(shop_id = shop.shop_id, %message, "platform rejected renewal");
                return RefreshOutcome::failed(shop.shop_id, FailureKind::PlatformRejected, message);
            }
        };

        let new_expires_at = now.timestamp_millis() + granted.expire_in * 1000;

        // The platform-side rotation already happened; a failed write here
        // leaves the stored refresh token unusable and must stand out in the
        // ledger for operator intervention.
        if let Err(err) = self
            .store
            .apply_renewal(
                shop.shop_id,
                &granted.access_token,
                &granted.refresh_token,
                new_expires_at,
            )
            .await
        {
            warn!(shop_id = shop.shop_id, error = %err, "persist failed after platform renewal");
            return RefreshOutcome::failed(
                shop.shop_id,
                FailureKind::Persist,
                format!("persist failed after renewal: {err}"),
            );
        }

        info!(
            shop_id = shop.shop_id,
            expires_at = new_expires_at,
            "token refreshed"
        );
        RefreshOutcome::success(shop.shop_id)
    }

    fn resolve_partner(&self, shop: &ShopCredential) -> Option<(i64, String)> {
        let partner_id = shop.partner_id.or(self.defaults.partner_id)?;
        let secret = shop
            .partner_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.defaults.partner_secret.clone().filter(|s| !s.is_empty()))?;
        Some((partner_id, secret))
    }
}

//! Credential refresh orchestration.

mod orchestrator;
mod pacing;

pub use orchestrator::{PartnerDefaults, RefreshLedger, RefreshOrchestrator};
pub use pacing::Pacer;

use chrono::Duration;
use serde::Serialize;

/// Why a shop failed to renew within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Neither the shop row nor the deployment defaults carry partner
    /// credentials; the shop is skipped, not retried within the run.
    MissingCredentials,
    /// The platform reported a business error for the renewal call.
    PlatformRejected,
    /// The platform could not be reached, or the store failed mid-flight.
    Transport,
    /// The platform already rotated the token but the store write failed.
    /// The old refresh token is now invalid on the platform side; this shows
    /// up distinctly so operators can intervene.
    Persist,
    /// Another run holds the renewal lease for this shop.
    LeaseHeld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Success,
    Failed,
}

/// Per-shop entry of the run ledger. Ephemeral; emitted in the run summary
/// only, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub shop_id: i64,
    pub status: RefreshStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RefreshOutcome {
    pub fn success(shop_id: i64) -> Self {
        Self {
            shop_id,
            status: RefreshStatus::Success,
            kind: None,
            detail: None,
        }
    }

    pub fn failed(shop_id: i64, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            shop_id,
            status: RefreshStatus::Failed,
            kind: Some(kind),
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RefreshStatus::Success
    }
}

/// Tuning knobs for one refresh pass. The same orchestrator serves any
/// window choice; these defaults renew half an hour ahead of expiry and
/// leave tokens expired for more than a day to the re-delegation flow.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Renew this far ahead of actual expiry.
    pub lookahead: Duration,
    /// Do not attempt renewal for tokens expired longer than this.
    pub max_staleness: Duration,
    /// Per-run cap on candidate shops.
    pub batch_size: i64,
    /// Inter-call spacing, honoring the platform's rate limit.
    pub pacing: std::time::Duration,
    /// How long a claimed renewal lease lives if never released.
    pub lease_ttl: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            lookahead: Duration::minutes(30),
            max_staleness: Duration::hours(24),
            batch_size: 20,
            pacing: std::time::Duration::from_secs(1),
            lease_ttl: Duration::seconds(60),
        }
    }
}

//! One scheduled run: refresh pass, downstream dispatch, per-shop sync,
//! merged into a single structured summary.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::credentials::SyncFlagStore;
use crate::dispatch::{JobDispatchOutcome, JobDispatcher, SyncLedger};
use crate::error::Result;
use crate::refresh::{Pacer, RefreshLedger, RefreshOrchestrator};

/// Structured summary of one run, serialized verbatim to the invocation
/// response.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub success: bool,
    /// Wall-clock stamp of the run, RFC 3339.
    pub timestamp: String,
    pub refreshed: usize,
    pub failed: usize,
    pub token_refresh: RefreshLedger,
    pub jobs: BTreeMap<String, JobDispatchOutcome>,
    pub data_sync: SyncLedger,
}

impl RunSummary {
    fn merge(
        now: DateTime<Utc>,
        token_refresh: RefreshLedger,
        job_outcomes: Vec<JobDispatchOutcome>,
        data_sync: SyncLedger,
    ) -> Self {
        let jobs = job_outcomes
            .into_iter()
            .map(|outcome| (outcome.job.clone(), outcome))
            .collect();

        Self {
            success: true,
            timestamp: now.to_rfc3339(),
            refreshed: token_refresh.refreshed,
            failed: token_refresh.failed,
            token_refresh,
            jobs,
            data_sync,
        }
    }
}

/// Facade over the full cadence. All collaborators are injected, so a test
/// can substitute any of them.
pub struct ScheduledRun {
    orchestrator: RefreshOrchestrator,
    dispatcher: JobDispatcher,
    flags: Arc<dyn SyncFlagStore>,
    pacing: std::time::Duration,
}

impl std::fmt::Debug for ScheduledRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledRun")
            .field("orchestrator", &self.orchestrator)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ScheduledRun {
    pub fn new(
        orchestrator: RefreshOrchestrator,
        dispatcher: JobDispatcher,
        flags: Arc<dyn SyncFlagStore>,
        pacing: std::time::Duration,
    ) -> Self {
        Self {
            orchestrator,
            dispatcher,
            flags,
            pacing,
        }
    }

    /// Execute one run at `now`. Only a failed candidate query aborts; every
    /// other failure lands in the summary. Dispatch runs unconditionally
    /// after the refresh pass, even when that pass had zero candidates or
    /// partial failures.
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let mut pacer = Pacer::new(self.pacing);

        let token_refresh = self.orchestrator.run(now, &mut pacer).await?;
        let job_outcomes = self.dispatcher.run_jobs().await;
        let data_sync = self.dispatcher.run_sync(self.flags.as_ref(), &mut pacer).await;

        Ok(RunSummary::merge(now, token_refresh, job_outcomes, data_sync))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::Value;

    use super::*;
    use crate::dispatch::{DispatchStatus, standing_jobs};
    use crate::refresh::{FailureKind, PartnerDefaults, RefreshPolicy, RefreshStatus};
    use crate::testing::{
        MemoryStore, RecordingInvoker, Script, ScriptedPlatform, StaticFlags, credential,
    };

    fn run_with(
        store: Arc<MemoryStore>,
        platform: Arc<ScriptedPlatform>,
        invoker: Arc<RecordingInvoker>,
        flags: Arc<StaticFlags>,
    ) -> ScheduledRun {
        let orchestrator = RefreshOrchestrator::new(
            store,
            platform,
            PartnerDefaults::default(),
            RefreshPolicy::default(),
        );
        let dispatcher = JobDispatcher::new(invoker, standing_jobs(), 10);
        ScheduledRun::new(orchestrator, dispatcher, flags, std::time::Duration::from_millis(0))
    }

    #[tokio::test]
    async fn end_to_end_mixed_outcomes() {
        // Shop 1 expires in 10 min, shop 2 in 20, both inside the 30-min
        // lookahead. The platform grants 1 and rejects 2.
        let now = Utc::now();
        let old_expiry_1 = (now + Duration::minutes(10)).timestamp_millis();
        let store = Arc::new(MemoryStore::with_rows([
            credential(1, old_expiry_1),
            credential(2, (now + Duration::minutes(20)).timestamp_millis()),
        ]));
        let platform = Arc::new(ScriptedPlatform::new([
            (1, Script::Grant { expire_in: 14_400 }),
            (2, Script::Deny("shop suspended")),
        ]));
        let invoker = Arc::new(RecordingInvoker::default());
        let flags = Arc::new(StaticFlags::with_shops(&[7]));

        let summary = run_with(store.clone(), platform, invoker.clone(), flags)
            .execute(now)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.token_refresh.total, 2);
        assert_eq!(summary.refreshed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.token_refresh.results[0].status, RefreshStatus::Success);
        assert_eq!(
            summary.token_refresh.results[1].kind,
            Some(FailureKind::PlatformRejected)
        );
        assert_eq!(
            summary.token_refresh.results[1].detail.as_deref(),
            Some("shop suspended")
        );
        assert!(store.row(1).expires_at > old_expiry_1);

        // Downstream jobs still ran, and the sync worker reached shop 7.
        assert_eq!(summary.jobs.len(), 2);
        assert!(summary.jobs.contains_key("promotion-scheduler"));
        assert!(summary.jobs.contains_key("budget-scheduler"));
        assert_eq!(summary.data_sync.processed, 1);
        assert_eq!(summary.data_sync.results[0].shop_id, Some(7));

        let invoked: Vec<_> = invoker.calls().iter().map(|(name, _)| name.clone()).collect();
        assert_eq!(
            invoked,
            vec!["promotion-scheduler", "budget-scheduler", "data-sync-worker"]
        );
    }

    #[tokio::test]
    async fn dispatch_runs_even_with_zero_refresh_candidates() {
        let store = Arc::new(MemoryStore::default());
        let platform = Arc::new(ScriptedPlatform::default());
        let invoker = Arc::new(RecordingInvoker::default());
        let flags = Arc::new(StaticFlags::with_shops(&[]));

        let summary = run_with(store, platform, invoker.clone(), flags)
            .execute(Utc::now())
            .await
            .unwrap();

        assert_eq!(summary.token_refresh.total, 0);
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn selection_failure_aborts_before_dispatch() {
        let store = Arc::new(MemoryStore::default());
        *store.fail_selection.lock().unwrap() = true;
        let platform = Arc::new(ScriptedPlatform::default());
        let invoker = Arc::new(RecordingInvoker::default());
        let flags = Arc::new(StaticFlags::with_shops(&[1]));

        let result = run_with(store, platform, invoker.clone(), flags)
            .execute(Utc::now())
            .await;

        assert!(result.is_err());
        // Nothing downstream runs on an unrecoverable selection error.
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn summary_serializes_to_the_wire_shape() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::with_rows([credential(
            1,
            (now + Duration::minutes(10)).timestamp_millis(),
        )]));
        let platform = Arc::new(ScriptedPlatform::new([(1, Script::Grant { expire_in: 3600 })]));
        let invoker = Arc::new(RecordingInvoker::default());
        let flags = Arc::new(StaticFlags::with_shops(&[]));

        let summary = run_with(store, platform, invoker, flags)
            .execute(now)
            .await
            .unwrap();
        let wire: Value = serde_json::to_value(&summary).unwrap();

        assert_eq!(wire["success"], Value::Bool(true));
        assert!(wire["timestamp"].is_string());
        assert_eq!(wire["refreshed"], 1);
        assert_eq!(wire["failed"], 0);
        assert_eq!(wire["token_refresh"]["total"], 1);
        assert_eq!(
            wire["token_refresh"]["results"][0]["status"],
            Value::String("success".to_string())
        );
        assert_eq!(
            wire["jobs"]["promotion-scheduler"]["status"],
            Value::String("completed".to_string())
        );
        assert_eq!(wire["data_sync"]["processed"], 0);
    }
}

//! Downstream job dispatch.
//!
//! After the refresh pass the service fires a fixed, ordered list of
//! downstream jobs, then a bounded per-shop sync pass over shops flagged for
//! automatic sync. Every invocation is wrapped individually: one job falling
//! over never prevents the jobs after it from running.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::credentials::SyncFlagStore;
use crate::error::Result;
use crate::refresh::Pacer;

/// Job name for the per-shop data sync worker.
pub const DATA_SYNC_JOB: &str = "data-sync-worker";

/// Fire one downstream job by name. Implementations decide what "remote"
/// means; the dispatcher only cares about the reply body.
#[async_trait]
pub trait JobInvoker: Send + Sync {
    async fn invoke(&self, job: &str, payload: Value) -> Result<Value>;
}

/// Invoker POSTing JSON to an HTTP function host at `{base_url}/{job}`,
/// authenticated with a bearer service token when one is configured.
#[derive(Debug, Clone)]
pub struct HttpJobInvoker {
    http: reqwest::Client,
    base_url: String,
    service_token: Option<String>,
}

impl HttpJobInvoker {
    pub fn new(base_url: impl Into<String>, service_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            service_token,
        })
    }
}

#[async_trait]
impl JobInvoker for HttpJobInvoker {
    async fn invoke(&self, job: &str, payload: Value) -> Result<Value> {
        let mut request = self
            .http
            .post(format!("{}/{}", self.base_url, job))
            .json(&payload);
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// One downstream job in the fixed dispatch order.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub payload: Value,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// The standing job list, in dispatch order: scheduled promotions first,
/// then budget adjustment. The per-shop sync worker runs afterwards against
/// the flagged shops.
pub fn standing_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec::new("promotion-scheduler", json!({ "action": "process" })),
        JobSpec::new("budget-scheduler", json!({ "action": "process" })),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Completed,
    Error,
}

/// Outcome of one downstream invocation; for per-shop jobs, one per shop.
#[derive(Debug, Clone, Serialize)]
pub struct JobDispatchOutcome {
    pub job: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<i64>,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of the per-shop sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncLedger {
    pub processed: usize,
    pub results: Vec<JobDispatchOutcome>,
}

/// Iterates the ordered job list and the per-shop sync batch, capturing each
/// invocation's success or failure independently.
pub struct JobDispatcher {
    invoker: Arc<dyn JobInvoker>,
    jobs: Vec<JobSpec>,
    sync_batch_size: i64,
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field("jobs", &self.jobs)
            .field("sync_batch_size", &self.sync_batch_size)
            .finish_non_exhaustive()
    }
}

impl JobDispatcher {
    pub fn new(invoker: Arc<dyn JobInvoker>, jobs: Vec<JobSpec>, sync_batch_size: i64) -> Self {
        Self {
            invoker,
            jobs,
            sync_batch_size,
        }
    }

    /// Run the fixed job list in order. Never fails as a whole.
    pub async fn run_jobs(&self) -> Vec<JobDispatchOutcome> {
        let mut outcomes = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            outcomes.push(self.invoke_one(&job.name, job.payload.clone(), None).await);
        }
        outcomes
    }

    /// Per-shop sync pass over shops flagged for automatic sync. A failed
    /// flag query is captured in the ledger rather than escalated; by that
    /// point the standing jobs have already run and their outcomes must
    /// survive.
    pub async fn run_sync(&self, flags: &dyn SyncFlagStore, pacer: &mut Pacer) -> SyncLedger {
        let targets = match flags.list_auto_sync_shops(self.sync_batch_size).await {
            Ok(targets) => targets,
            Err(err) => {
                warn!(error = %err, "failed to list shops flagged for sync");
                return SyncLedger {
                    processed: 0,
                    results: vec![JobDispatchOutcome {
                        job: DATA_SYNC_JOB.to_string(),
                        shop_id: None,
                        status: DispatchStatus::Error,
                        detail: Some(format!("sync flag query failed: {err}")),
                    }],
                };
            }
        };

        info!(count = targets.len(), "dispatching per-shop sync");

        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            pacer.admit().await;
            let payload = json!({
                "action": "sync-promotion-data",
                "shop_id": target.shop_id,
                "user_id": target.user_id,
            });
            results.push(
                self.invoke_one(DATA_SYNC_JOB, payload, Some(target.shop_id))
                    .await,
            );
        }

        SyncLedger {
            processed: results.len(),
            results,
        }
    }

    async fn invoke_one(
        &self,
        job: &str,
        payload: Value,
        shop_id: Option<i64>,
    ) -> JobDispatchOutcome {
        match self.invoker.invoke(job, payload).await {
            Ok(body) => {
                if let Some(message) = remote_error(&body) {
                    warn!(job, shop_id = ?shop_id, %message, "job reported an error");
                    JobDispatchOutcome {
                        job: job.to_string(),
                        shop_id,
                        status: DispatchStatus::Error,
                        detail: Some(message),
                    }
                } else {
                    info!(job, shop_id = ?shop_id, "job completed");
                    JobDispatchOutcome {
                        job: job.to_string(),
                        shop_id,
                        status: DispatchStatus::Completed,
                        detail: None,
                    }
                }
            }
            Err(err) => {
                warn!(job, shop_id = ?shop_id, error = %err, "job invocation failed");
                JobDispatchOutcome {
                    job: job.to_string(),
                    shop_id,
                    status: DispatchStatus::Error,
                    detail: Some(err.to_string()),
                }
            }
        }
    }
}

/// A reply body with a non-null `error` field is a remote-reported failure;
/// the human-readable `message` is preferred when present.
fn remote_error(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    if error.is_null() {
        return None;
    }
    let fallback = || {
        error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string())
    };
    Some(
        body.get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(fallback),
    )
}

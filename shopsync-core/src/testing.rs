//! Shared in-memory doubles for exercising the orchestration seams.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::credentials::{CredentialStore, ShopCredential, SyncFlagStore, SyncTarget};
use crate::dispatch::JobInvoker;
use crate::error::{Error, Result};
use crate::platform::{GrantedTokens, PlatformApi, RefreshReply};

pub(crate) fn credential(shop_id: i64, expires_at: i64) -> ShopCredential {
    ShopCredential {
        shop_id,
        access_token: format!("access-{shop_id}"),
        refresh_token: format!("refresh-{shop_id}"),
        expires_at,
        partner_id: Some(1000),
        partner_secret: Some("partner-secret".to_string()),
        token_updated_at: None,
    }
}

/// Credential store over a plain map, mirroring the Postgres window and
/// lease semantics.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub rows: Mutex<HashMap<i64, ShopCredential>>,
    pub leases: Mutex<HashMap<i64, DateTime<Utc>>>,
    pub fail_renewal_for: Mutex<HashSet<i64>>,
    pub fail_selection: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_rows(rows: impl IntoIterator<Item = ShopCredential>) -> Self {
        let store = Self::default();
        {
            let mut map = store.rows.lock().unwrap();
            for row in rows {
                map.insert(row.shop_id, row);
            }
        }
        store
    }

    pub fn row(&self, shop_id: i64) -> ShopCredential {
        self.rows
            .lock()
            .unwrap()
            .get(&shop_id)
            .expect("row should exist")
            .clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn list_expiring_soon(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
        max_staleness: Duration,
        limit: i64,
    ) -> Result<Vec<ShopCredential>> {
        if *self.fail_selection.lock().unwrap() {
            return Err(Error::Internal("selection query failed".to_string()));
        }

        let upper = (now + lookahead).timestamp_millis();
        let lower = (now - max_staleness).timestamp_millis();

        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| {
                row.expires_at < upper
                    && row.expires_at > lower
                    && row.partner_id.is_some()
                    && row.partner_secret.is_some()
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.expires_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn apply_renewal(
        &self,
        shop_id: i64,
        access_token: &str,
        refresh_token: &str,
        expires_at: i64,
    ) -> Result<()> {
        if self.fail_renewal_for.lock().unwrap().contains(&shop_id) {
            return Err(Error::Internal("store write rejected".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&shop_id).ok_or(Error::ShopGone(shop_id))?;
        row.access_token = access_token.to_string();
        row.refresh_token = refresh_token.to_string();
        row.expires_at = expires_at;
        row.token_updated_at = Some(Utc::now());
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        shop_id: i64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let mut leases = self.leases.lock().unwrap();
        match leases.get(&shop_id) {
            Some(until) if *until >= now => Ok(false),
            _ => {
                leases.insert(shop_id, now + ttl);
                Ok(true)
            }
        }
    }

    async fn release_lease(&self, shop_id: i64) -> Result<()> {
        self.leases.lock().unwrap().remove(&shop_id);
        Ok(())
    }
}

/// What the platform double should answer for a given shop.
#[derive(Debug)]
pub(crate) enum Script {
    Grant { expire_in: i64 },
    Deny(&'static str),
    Unreachable,
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedPlatform {
    scripts: HashMap<i64, Script>,
    calls: Mutex<Vec<i64>>,
}

impl ScriptedPlatform {
    pub fn new(scripts: impl IntoIterator<Item = (i64, Script)>) -> Self {
        Self {
            scripts: scripts.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Shop ids in call order.
    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformApi for ScriptedPlatform {
    async fn refresh(
        &self,
        _partner_id: i64,
        _secret: &str,
        _refresh_token: &str,
        shop_id: i64,
    ) -> Result<RefreshReply> {
        self.calls.lock().unwrap().push(shop_id);
        match self.scripts.get(&shop_id) {
            Some(Script::Grant { expire_in }) => Ok(RefreshReply::Granted(GrantedTokens {
                access_token: format!("rotated-access-{shop_id}"),
                refresh_token: format!("rotated-refresh-{shop_id}"),
                expire_in: *expire_in,
            })),
            Some(Script::Deny(message)) => Ok(RefreshReply::Denied {
                message: (*message).to_string(),
            }),
            Some(Script::Unreachable) | None => {
                Err(Error::Internal("connection refused".to_string()))
            }
        }
    }
}

/// Job invoker that records every call and fails on request.
#[derive(Debug, Default)]
pub(crate) struct RecordingInvoker {
    fail_jobs: HashSet<String>,
    error_body_jobs: HashSet<String>,
    fail_shops: HashSet<i64>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingInvoker {
    pub fn failing(jobs: &[&str]) -> Self {
        Self {
            fail_jobs: jobs.iter().map(|j| (*j).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_error_bodies(jobs: &[&str]) -> Self {
        Self {
            error_body_jobs: jobs.iter().map(|j| (*j).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_shops(shops: &[i64]) -> Self {
        Self {
            fail_shops: shops.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobInvoker for RecordingInvoker {
    async fn invoke(&self, job: &str, payload: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((job.to_string(), payload.clone()));

        if self.fail_jobs.contains(job) {
            return Err(Error::Internal(format!("{job} unreachable")));
        }
        if let Some(shop_id) = payload.get("shop_id").and_then(Value::as_i64)
            && self.fail_shops.contains(&shop_id)
        {
            return Err(Error::Internal(format!("sync for shop {shop_id} unreachable")));
        }
        if self.error_body_jobs.contains(job) {
            return Ok(json!({ "error": "job_failed", "message": format!("{job} fell over") }));
        }
        Ok(json!({ "status": "ok" }))
    }
}

/// Fixed sync-flag listing.
#[derive(Debug, Default)]
pub(crate) struct StaticFlags {
    pub targets: Vec<SyncTarget>,
    pub fail: bool,
}

impl StaticFlags {
    pub fn with_shops(ids: &[i64]) -> Self {
        Self {
            targets: ids
                .iter()
                .map(|&shop_id| SyncTarget {
                    shop_id,
                    user_id: Uuid::new_v4(),
                })
                .collect(),
            fail: false,
        }
    }
}

#[async_trait]
impl SyncFlagStore for StaticFlags {
    async fn list_auto_sync_shops(&self, limit: i64) -> Result<Vec<SyncTarget>> {
        if self.fail {
            return Err(Error::Internal("sync settings query failed".to_string()));
        }
        Ok(self.targets.iter().take(limit as usize).cloned().collect())
    }
}

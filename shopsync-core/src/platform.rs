//! Client for the external marketplace platform.
//!
//! The only call this service makes on its own behalf is the signed
//! token-exchange POST that trades a refresh token for a fresh access/refresh
//! pair. Business rejections reported by the platform are data
//! ([`RefreshReply::Denied`]), not errors; only transport failures and
//! malformed bodies surface as `Err`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::signing::sign_request;

/// Token-exchange endpoint path, fixed by the platform.
pub const ACCESS_TOKEN_PATH: &str = "/api/v2/auth/access_token/get";

/// Tokens granted by the platform in exchange for a refresh token.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the new access token, in seconds.
    pub expire_in: i64,
}

/// Outcome of a renewal call that reached the platform and produced a
/// well-formed response.
#[derive(Debug, Clone)]
pub enum RefreshReply {
    Granted(GrantedTokens),
    Denied { message: String },
}

/// Seam between the refresh orchestrator and the marketplace, so renewal
/// logic can be exercised against a scripted double.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn refresh(
        &self,
        partner_id: i64,
        secret: &str,
        refresh_token: &str,
        shop_id: i64,
    ) -> Result<RefreshReply>;
}

/// Production client over `reqwest`. All traffic may be routed through a
/// configurable forwarding endpoint that wraps the target URL; this is a
/// deployment concern and invisible to callers.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    proxy_url: Option<String>,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>, proxy_url: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            proxy_url,
        })
    }

    /// Wrap the target URL in the forwarding endpoint when one is configured.
    fn effective_url(&self, target: &str) -> String {
        match &self.proxy_url {
            Some(proxy) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
                format!("{proxy}?url={encoded}")
            }
            None => target.to_string(),
        }
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn refresh(
        &self,
        partner_id: i64,
        secret: &str,
        refresh_token: &str,
        shop_id: i64,
    ) -> Result<RefreshReply> {
        let timestamp = Utc::now().timestamp();
        let sign = sign_request(secret, partner_id, ACCESS_TOKEN_PATH, timestamp);
        let target = format!(
            "{}{}?partner_id={}&timestamp={}&sign={}",
            self.base_url, ACCESS_TOKEN_PATH, partner_id, timestamp, sign
        );

        let response = self
            .http
            .post(self.effective_url(&target))
            .json(&json!({
                "refresh_token": refresh_token,
                "partner_id": partner_id,
                "shop_id": shop_id,
            }))
            .send()
            .await?;

        let body = response.text().await?;
        parse_refresh_body(&body)
    }
}

#[derive(Debug, Deserialize)]
struct WireBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expire_in: Option<i64>,
}

/// Interpret a token-exchange response body. The platform signals "no error"
/// either by omitting the `error` field or with the sentinel values `""` and
/// `"-"`.
pub(crate) fn parse_refresh_body(body: &str) -> Result<RefreshReply> {
    let wire: WireBody = serde_json::from_str(body)?;

    if let Some(code) = wire.error.as_deref()
        && !code.is_empty()
        && code != "-"
    {
        let message = wire.message.unwrap_or_else(|| code.to_string());
        return Ok(RefreshReply::Denied { message });
    }

    match (wire.access_token, wire.refresh_token, wire.expire_in) {
        (Some(access_token), Some(refresh_token), Some(expire_in)) => {
            Ok(RefreshReply::Granted(GrantedTokens {
                access_token,
                refresh_token,
                expire_in,
            }))
        }
        _ => Err(Error::Internal(
            "platform response carried neither an error nor a token grant".to_string(),
        )),
    }
}

use std::env;
use std::time::Duration;

use anyhow::Context;
use shopsync_core::refresh::{PartnerDefaults, RefreshPolicy};

/// Service configuration loaded from environment variables (a `.env` file is
/// honored when present).
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Database settings
    pub database_url: String,

    // Platform settings
    pub platform_base_url: String,
    pub platform_proxy_url: Option<String>,
    pub default_partner_id: Option<i64>,
    pub default_partner_secret: Option<String>,

    // Downstream job host
    pub jobs_base_url: String,
    pub jobs_service_token: Option<String>,

    // Refresh tuning
    pub refresh_lookahead_secs: i64,
    pub refresh_max_staleness_secs: i64,
    pub refresh_batch_size: i64,
    pub refresh_pacing_ms: u64,
    pub sync_batch_size: i64,

    // CORS settings
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,

            platform_base_url: env::var("PLATFORM_BASE_URL")
                .unwrap_or_else(|_| "https://partner.shopeemobile.com".to_string()),
            platform_proxy_url: env::var("PLATFORM_PROXY_URL").ok().filter(|v| !v.is_empty()),
            default_partner_id: env::var("DEFAULT_PARTNER_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
            default_partner_secret: env::var("DEFAULT_PARTNER_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),

            jobs_base_url: env::var("JOBS_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9000/functions".to_string()),
            jobs_service_token: env::var("JOBS_SERVICE_TOKEN").ok().filter(|v| !v.is_empty()),

            refresh_lookahead_secs: env_i64("REFRESH_LOOKAHEAD_SECS", 30 * 60),
            refresh_max_staleness_secs: env_i64("REFRESH_MAX_STALENESS_SECS", 24 * 60 * 60),
            refresh_batch_size: env_i64("REFRESH_BATCH_SIZE", 20),
            refresh_pacing_ms: env_i64("REFRESH_PACING_MS", 1000).max(0) as u64,
            sync_batch_size: env_i64("SYNC_BATCH_SIZE", 10),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            lookahead: chrono::Duration::seconds(self.refresh_lookahead_secs),
            max_staleness: chrono::Duration::seconds(self.refresh_max_staleness_secs),
            batch_size: self.refresh_batch_size,
            pacing: Duration::from_millis(self.refresh_pacing_ms),
            lease_ttl: chrono::Duration::seconds(60),
        }
    }

    pub fn partner_defaults(&self) -> PartnerDefaults {
        PartnerDefaults {
            partner_id: self.default_partner_id,
            partner_secret: self.default_partner_secret.clone(),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

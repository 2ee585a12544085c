use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::Utc;
use shopsync_core::run::RunSummary;

use crate::{AppState, errors::AppResult};

/// Create the main API router with all versions.
pub fn create_api_router(state: AppState) -> Router {
    Router::new().nest("/api/v1", create_v1_router(state))
}

fn create_v1_router(state: AppState) -> Router {
    Router::new()
        .route("/cron/run", post(run_cron).get(run_cron))
        .route("/health", get(health))
        .with_state(state)
}

/// Entry point for the external periodic scheduler. No body; the run's full
/// structured summary comes back as JSON. Partial failure never changes the
/// status code; only an unrecoverable pre-dispatch error yields HTTP 500.
async fn run_cron(State(state): State<AppState>) -> AppResult<Json<RunSummary>> {
    let summary = state.scheduled_run().execute(Utc::now()).await?;
    Ok(Json(summary))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::state::AppState;
use crate::sweeper::SweepReport;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
    pub last_sweep: Option<SweepReport>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.files.cache().stats(),
        last_sweep: state.sweeper.last_report().await,
    })
}

//! Cache statistics handler

use axum::{extract::State, Json};
use niibot_common::cache::CacheStatsReport;

use crate::AppState;

/// Hit, miss and eviction counters for every cache level
pub async fn stats(State(state): State<AppState>) -> Json<CacheStatsReport> {
    Json(state.pipeline.cache_stats().await)
}

//! Health check handlers

use axum::{extract::State, Json};
use niibot_common::collections::CollectionHealth;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub registry_entities: usize,
    pub collections: BTreeMap<String, CheckResult>,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CollectionHealth> for CheckResult {
    fn from(health: CollectionHealth) -> Self {
        match health {
            CollectionHealth::Available { documents } => CheckResult {
                status: "up".to_string(),
                documents: Some(documents),
                error: None,
            },
            CollectionHealth::Unavailable { reason } => CheckResult {
                status: "down".to_string(),
                documents: None,
                error: Some(reason),
            },
        }
    }
}

/// Liveness check - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: niibot_common::VERSION.to_string(),
    })
}

/// Readiness check - reports every collection
///
/// The service is "ready" while at least one collection answers; queries
/// against the others are answered in degraded mode.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let collections: BTreeMap<String, CheckResult> = state
        .retriever
        .catalog()
        .health()
        .await
        .into_iter()
        .map(|(domain, health)| (domain.to_string(), CheckResult::from(health)))
        .collect();

    let any_up = collections.values().any(|c| c.status == "up");
    let all_up = collections.values().all(|c| c.status == "up");
    let status = match (any_up, all_up) {
        (true, true) => "ready",
        (true, false) => "degraded",
        (false, _) => "not_ready",
    };

    Json(ReadyResponse {
        status: status.to_string(),
        checks: HealthChecks {
            registry_entities: state.registry_entities,
            collections,
        },
    })
}

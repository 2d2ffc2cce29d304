//! Query handler - the HTTP face of the pipeline

use axum::{extract::State, Json};
use niibot_common::errors::{AppError, Result};
use niibot_context::QueryResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;

/// Query request
///
/// Content rules (empty, too long, injection) are enforced by the pipeline's
/// security filter so that users get a readable refusal; validation here only
/// bounds the request size.
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(max = 20000))]
    pub query: String,

    /// Conversation to continue; a new one is started when absent
    #[validate(length(min = 1, max = 128))]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryApiResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub response: QueryResponse,
}

/// Answer one question
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryApiResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let response = state.pipeline.process(&request.query, &session_id).await;

    Ok(Json(QueryApiResponse { session_id, response }))
}

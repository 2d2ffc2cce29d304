//! Session handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use niibot_common::context::ConversationTurn;
use niibot_common::errors::{AppError, Result};
use serde::Serialize;

use crate::AppState;

/// Session state response
#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub fingerprint: String,
    pub turns: Vec<ConversationTurn>,
}

/// Recent turns of a session, oldest first
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>> {
    let memory = state.pipeline.memory();
    let turns = memory.recent_context(&session_id, memory.max_turns()).await;
    if turns.is_empty() {
        return Err(AppError::SessionNotFound { id: session_id });
    }

    let fingerprint = memory.fingerprint(&session_id).await;

    Ok(Json(SessionResponse {
        session_id,
        fingerprint: fingerprint.as_str().to_string(),
        turns,
    }))
}

/// Forget a session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode> {
    if !state.pipeline.memory().clear(&session_id).await {
        return Err(AppError::SessionNotFound { id: session_id });
    }

    tracing::info!(session_id = %session_id, "Session cleared");
    Ok(StatusCode::NO_CONTENT)
}

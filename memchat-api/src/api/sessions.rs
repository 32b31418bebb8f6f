use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::{
    core::{
        config::SessionScope,
        session_manager::{SessionManager, SessionOverview},
    },
    models::error::{ApiError, ApiResult},
};

#[derive(Clone)]
pub struct SessionState {
    pub sessions: Arc<SessionManager>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub scope: SessionScope,
    pub sessions: Vec<SessionOverview>,
}

pub async fn list_sessions(State(state): State<SessionState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(SessionListResponse {
        scope: state.sessions.scope(),
        sessions: state.sessions.list(),
    }))
}

pub async fn get_session(
    State(state): State<SessionState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .sessions
        .get(&key)
        .ok_or_else(|| ApiError::NotFound(format!("Session {key} not found")))?;

    let snapshot = session.lock().snapshot();
    Ok(Json(snapshot))
}

pub async fn delete_session(
    State(state): State<SessionState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.sessions.remove(&key) {
        return Err(ApiError::NotFound(format!("Session {key} not found")));
    }

    info!("Session {} dropped", key);
    Ok(StatusCode::NO_CONTENT)
}

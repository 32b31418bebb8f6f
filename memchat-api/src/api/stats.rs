use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use crate::{
    core::{
        config::SessionScope,
        orchestrator::ChatOrchestrator,
        tasks::{TaskFailure, TaskStats},
    },
    models::error::ApiResult,
};

#[derive(Clone)]
pub struct StatsState {
    pub orchestrator: ChatOrchestrator,
}

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub background: TaskStats,
    pub recent_failures: Vec<TaskFailure>,
    pub sessions: usize,
    pub session_scope: SessionScope,
    pub model: String,
    pub memory_store: &'static str,
    pub version: &'static str,
}

pub async fn get_stats(State(state): State<StatsState>) -> ApiResult<impl IntoResponse> {
    let orchestrator = &state.orchestrator;
    let stats = SystemStats {
        background: orchestrator.tasks().stats(),
        recent_failures: orchestrator.tasks().recent_failures(),
        sessions: orchestrator.sessions().len(),
        session_scope: orchestrator.sessions().scope(),
        model: orchestrator.model().to_string(),
        memory_store: orchestrator.store_backend(),
        version: env!("CARGO_PKG_VERSION"),
    };

    Ok(Json(stats))
}

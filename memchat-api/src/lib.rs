//! Memory-augmented chat gateway
//!
//! Every reply is conditioned on three memory tiers: the recent turns of the
//! session, a rolling summary of older turns, and long-term facts about the
//! user held in an external store. See [`crate::core::orchestrator`] for the
//! request pipeline.

use anyhow::Result;
use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tracing::info;

pub mod api;
pub mod core;
pub mod middleware;
pub mod models;
pub mod utils;

use crate::core::{config::{ResponseMode, Settings}, orchestrator::ChatOrchestrator};
use crate::middleware::{error_handler, request_id};

/// Assemble the HTTP routes around an existing orchestrator
pub fn build_router(orchestrator: ChatOrchestrator, response_mode: ResponseMode) -> Router {
    let chat_state = api::chat::ChatState::new(orchestrator.clone(), response_mode);
    let session_state = api::sessions::SessionState {
        sessions: orchestrator.sessions().clone(),
    };
    let stats_state = api::stats::StatsState { orchestrator };

    let chat_routes = Router::new()
        .route("/", get(api::chat::welcome))
        .route("/chat/", post(api::chat::chat))
        .route("/chat", post(api::chat::chat))
        .with_state(chat_state);

    let session_routes = Router::new()
        .route("/v1/sessions", get(api::sessions::list_sessions))
        .route(
            "/v1/sessions/:key",
            get(api::sessions::get_session).delete(api::sessions::delete_session),
        )
        .with_state(session_state);

    let stats_routes = Router::new()
        .route("/stats", get(api::stats::get_stats))
        .with_state(stats_state);

    Router::new()
        .route("/health", get(health_check))
        .merge(chat_routes)
        .merge(session_routes)
        .merge(stats_routes)
        .layer(axum_middleware::from_fn(request_id::add_request_id))
        .layer(axum_middleware::from_fn(error_handler::handle_errors))
        .layer(CorsLayer::permissive())
}

/// Wire the configured backends and build the application
pub async fn create_app(settings: Settings) -> Result<Router> {
    let orchestrator = ChatOrchestrator::from_settings(&settings).await?;
    orchestrator.sessions().start_cleanup_loop();

    info!(
        "Sessions scoped {:?}, summary every {} turns, idle eviction after {} minutes",
        settings.memory.session_scope,
        settings.memory.buffer_threshold,
        settings.memory.idle_timeout_minutes
    );

    Ok(build_router(orchestrator, settings.chat.response_mode))
}

async fn health_check() -> &'static str {
    "OK"
}

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::{
    core::{config::ResponseMode, orchestrator::ChatOrchestrator},
    models::{
        chat::{ChatRequest, ChatResponse, WelcomeResponse},
        error::{ApiError, ApiResult},
    },
    utils::streaming::{await_first_token, create_text_stream},
};

#[derive(Clone)]
pub struct ChatState {
    pub orchestrator: ChatOrchestrator,
    pub response_mode: ResponseMode,
}

impl ChatState {
    pub fn new(orchestrator: ChatOrchestrator, response_mode: ResponseMode) -> Self {
        Self {
            orchestrator,
            response_mode,
        }
    }
}

pub async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse::default())
}

pub async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message cannot be empty".to_string()));
    }

    info!(
        "Chat request from user {} ({:?} mode)",
        request.user_id, state.response_mode
    );

    match state.response_mode {
        ResponseMode::Streaming => {
            let tokens = state
                .orchestrator
                .chat_stream(request.message, request.user_id);
            let tokens = await_first_token(tokens).await?;
            Ok(create_text_stream(tokens))
        },
        ResponseMode::Blocking => {
            let response = state
                .orchestrator
                .chat(&request.message, &request.user_id)
                .await?;
            Ok(Json(ChatResponse { response }).into_response())
        },
    }
}

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    extractors::ValidatedJson,
    models::ai::{
        ChatRequest, ChatResponse, ExplainRequest, ExplainResponse, FeedbackRequest,
        FeedbackResponse, GenerateQuizRequest, GenerateQuizResponse,
    },
    services::{ai_client::AiError, tutor_service::TutorService, AppState},
};

use super::error::ApiError;

fn tutor(state: &AppState) -> Result<&TutorService, ApiError> {
    state
        .tutor
        .as_ref()
        .ok_or_else(|| ApiError::from(AiError::NotConfigured))
}

/// POST /api/ai/quiz
pub async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<GenerateQuizRequest>,
) -> Result<Json<GenerateQuizResponse>, ApiError> {
    let response = tutor(&state)?.generate_quiz(&req).await?;
    Ok(Json(response))
}

/// POST /api/ai/feedback
pub async fn feedback(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let response = tutor(&state)?.grade_feedback(&req).await?;
    Ok(Json(response))
}

/// POST /api/ai/explain
pub async fn explain(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<ExplainRequest>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let response = tutor(&state)?.explain_concept(&req).await?;
    Ok(Json(response))
}

/// POST /api/ai/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    tracing::debug!("Tutor chat with {} messages", req.messages.len());
    let response = tutor(&state)?.chat(&req).await?;
    Ok(Json(response))
}

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatbotQuery {
    #[serde(default)]
    pub question: Option<String>,
}

pub async fn chatbot_query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatbotQuery>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(query) = payload.map_err(|rejection| {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let question = query.question.as_deref().map(str::trim).unwrap_or_default();
    if question.is_empty() {
        return Err(ApiError::BadRequest("Question is required".to_string()));
    }

    if state.query_limiter.check().is_err() {
        tracing::warn!("Chatbot rate limit exceeded");
        return Err(ApiError::TooManyRequests);
    }

    // Initialization failures are a server fault; per-question failures come
    // back inside the answer text.
    state.pipeline.initialize().await.map_err(|err| {
        tracing::error!("Chatbot unavailable: {}", err);
        ApiError::Internal(format!("Chatbot is unavailable: {}", err))
    })?;

    let answer = state.pipeline.ask(question).await;
    Ok(Json(json!({
        "answer": answer,
        "question": question,
        "status": "success",
    })))
}

pub async fn chatbot_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "chatbot_status": state.pipeline.status(),
    }))
}

use axum::{Json, Router, extract::State, response::Json as ResponseJson, routing::post};
use services::services::bubbles::{ChatRequest, ChatResponse};
use utils::response::ApiResponse;

use crate::{Deployment, error::ApiError};

/// Ask Bubbles about a project
pub async fn chat(
    State(deployment): State<Deployment>,
    Json(request): Json<ChatRequest>,
) -> Result<ResponseJson<ApiResponse<ChatResponse>>, ApiError> {
    let response = deployment.bubbles().chat(&request).await?;
    Ok(ResponseJson(ApiResponse::success(response)))
}

pub fn router(_deployment: &Deployment) -> Router<Deployment> {
    Router::new().route("/bubbles/chat", post(chat))
}

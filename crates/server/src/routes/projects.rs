//! Routes for a project's workflow: status, initialization and line item completion.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::notification::Notification;
use serde::Deserialize;
use services::services::workflow_progress::{
    InitializedWorkflow, LineItemCompletion, ProjectWorkflowStatus, WorkflowProgressService,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{Deployment, error::ApiError};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CompleteLineItemRequest {
    pub completed_by: Option<String>,
}

/// Progress of a project's workflow, or `NO TRACKER` when it was never initialized
pub async fn get_project_workflow(
    State(deployment): State<Deployment>,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ProjectWorkflowStatus>>, ApiError> {
    let status = WorkflowProgressService::new(deployment.db().clone())
        .project_status(project_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

pub async fn initialize_project_workflow(
    State(deployment): State<Deployment>,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<InitializedWorkflow>>, ApiError> {
    let initialized = WorkflowProgressService::new(deployment.db().clone())
        .initialize_project(project_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(initialized)))
}

pub async fn complete_line_item(
    State(deployment): State<Deployment>,
    Path((project_id, line_item_id)): Path<(Uuid, Uuid)>,
    payload: Option<Json<CompleteLineItemRequest>>,
) -> Result<ResponseJson<ApiResponse<LineItemCompletion>>, ApiError> {
    let completed_by = payload.and_then(|Json(request)| request.completed_by);
    let completion = WorkflowProgressService::new(deployment.db().clone())
        .complete_line_item(project_id, line_item_id, completed_by)
        .await?;
    Ok(ResponseJson(ApiResponse::success(completion)))
}

/// Unread notifications of a project, newest first
pub async fn get_project_notifications(
    State(deployment): State<Deployment>,
    Path(project_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Notification>>>, ApiError> {
    let notifications =
        Notification::find_unread_by_project_id(&deployment.db().pool, project_id).await?;
    Ok(ResponseJson(ApiResponse::success(notifications)))
}

pub fn router(_deployment: &Deployment) -> Router<Deployment> {
    Router::new().nest(
        "/projects/{project_id}",
        Router::new()
            .route("/workflow", get(get_project_workflow))
            .route("/workflow/initialize", post(initialize_project_workflow))
            .route(
                "/workflow/line-items/{line_item_id}/complete",
                post(complete_line_item),
            )
            .route("/notifications", get(get_project_notifications)),
    )
}

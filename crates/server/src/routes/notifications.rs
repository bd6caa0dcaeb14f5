use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::post,
};
use db::models::notification::Notification;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{Deployment, error::ApiError};

pub async fn mark_notification_read(
    State(deployment): State<Deployment>,
    Path(notification_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let updated = Notification::mark_read(&deployment.db().pool, notification_id).await?;
    if updated == 0 {
        return Err(ApiError::NotFound(format!("notification {notification_id}")));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(_deployment: &Deployment) -> Router<Deployment> {
    Router::new().route("/notifications/{notification_id}/read", post(mark_notification_read))
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::notification::NotificationError;
use services::services::{
    bubbles::BubblesError, database_validator::DatabaseValidationError,
    workflow_definition::WorkflowDefinitionError, workflow_progress::WorkflowProgressError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    WorkflowDefinition(#[from] WorkflowDefinitionError),
    #[error(transparent)]
    WorkflowProgress(#[from] WorkflowProgressError),
    #[error(transparent)]
    Bubbles(#[from] BubblesError),
    #[error(transparent)]
    DatabaseValidation(#[from] DatabaseValidationError),
    #[error("not found: {0}")]
    NotFound(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::WorkflowDefinition(err) => match err {
                WorkflowDefinitionError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                WorkflowDefinitionError::UnknownLineItem(_) => StatusCode::NOT_FOUND,
                WorkflowDefinitionError::EmptyUpdate
                | WorkflowDefinitionError::EmptyName(_)
                | WorkflowDefinitionError::DuplicateId(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::WorkflowProgress(err) => progress_status(err),
            ApiError::Bubbles(err) => match err {
                BubblesError::EmptyMessage => StatusCode::BAD_REQUEST,
                BubblesError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
                BubblesError::Progress(err) => progress_status(err),
                BubblesError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Database(_) | ApiError::Notification(_) | ApiError::DatabaseValidation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn progress_status(err: &WorkflowProgressError) -> StatusCode {
    match err {
        WorkflowProgressError::ProjectNotFound(_)
        | WorkflowProgressError::TrackerNotFound(_)
        | WorkflowProgressError::UnknownLineItem(_) => StatusCode::NOT_FOUND,
        WorkflowProgressError::EmptyWorkflow => StatusCode::CONFLICT,
        WorkflowProgressError::Database(_) | WorkflowProgressError::Notification(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let response = ApiResponse::<()>::error(&message);
        (status, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            ApiError::from(WorkflowDefinitionError::EmptyName(id)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(WorkflowProgressError::TrackerNotFound(id)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(BubblesError::Progress(WorkflowProgressError::ProjectNotFound(id)))
                .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use serde::Serialize;
use services::services::database_validator::{DatabaseValidator, ValidationResult};
use utils::response::ApiResponse;

use crate::{Deployment, error::ApiError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub ok: bool,
    pub summary: String,
    pub database: ValidationResult,
    pub alert_poll_interval_secs: u64,
    pub assistant_configured: bool,
}

pub async fn health(
    State(deployment): State<Deployment>,
) -> Result<ResponseJson<ApiResponse<HealthStatus>>, ApiError> {
    let database = DatabaseValidator::new(deployment.db().pool.clone())
        .validate()
        .await?;
    let config = deployment.config();

    Ok(ResponseJson(ApiResponse::success(HealthStatus {
        ok: database.is_ok(),
        summary: database.summary(),
        database,
        alert_poll_interval_secs: config.alert_poll_interval.as_secs(),
        assistant_configured: config.anthropic_api_key.is_some(),
    })))
}

pub fn router(_deployment: &Deployment) -> Router<Deployment> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::test_support::{app, send};

    #[tokio::test]
    async fn test_health_reports_migrated_database() {
        let (app, _db) = app().await;
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["ok"], true);
        assert_eq!(body["data"]["assistantConfigured"], false);
    }
}

//! Routes for the workflow catalog and workflow alerts.

use axum::{
    Json, Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::{
    notification::{Notification, NotificationType},
    workflow::LineItemNameUpdate,
};
use serde::{Deserialize, Serialize};
use services::services::workflow_definition::{WorkflowDefinition, bulk_rename_line_items};
use tracing::warn;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{Deployment, error::ApiError};

const DEFAULT_ALERT_LIMIT: i64 = 50;
const MAX_ALERT_LIMIT: i64 = 500;

#[derive(Debug, Deserialize, TS)]
pub struct BulkLineItemUpdate {
    pub updates: Vec<LineItemNameUpdate>,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct BulkLineItemUpdateResult {
    pub updated: usize,
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AlertList {
    pub alerts: Vec<Notification>,
    /// Stored alerts whose payload could not be decoded
    pub malformed: usize,
}

/// Get the full phase → step → line item catalog
pub async fn get_definition(
    State(deployment): State<Deployment>,
) -> Result<ResponseJson<ApiResponse<WorkflowDefinition>>, ApiError> {
    let definition = WorkflowDefinition::load(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(definition)))
}

/// Rename several line items at once; nothing is applied if any update is invalid
pub async fn bulk_update_line_items(
    State(deployment): State<Deployment>,
    Json(payload): Json<BulkLineItemUpdate>,
) -> Result<ResponseJson<ApiResponse<BulkLineItemUpdateResult>>, ApiError> {
    let updated = bulk_rename_line_items(&deployment.db().pool, &payload.updates).await?;
    Ok(ResponseJson(ApiResponse::success(BulkLineItemUpdateResult {
        updated,
    })))
}

/// Most recent workflow alerts, newest first
pub async fn get_alerts(
    State(deployment): State<Deployment>,
    Query(query): Query<AlertsQuery>,
) -> Result<ResponseJson<ApiResponse<AlertList>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ALERT_LIMIT)
        .clamp(1, MAX_ALERT_LIMIT);
    let rows =
        Notification::decode_by_type(&deployment.db().pool, NotificationType::WorkflowAlert, limit)
            .await?;

    let mut list = AlertList {
        alerts: Vec::with_capacity(rows.len()),
        malformed: 0,
    };
    for row in rows {
        match row {
            Ok(alert) => list.alerts.push(alert),
            Err(e) => {
                list.malformed += 1;
                warn!(error = %e, "Skipping workflow alert with unreadable payload");
            }
        }
    }

    Ok(ResponseJson(ApiResponse::success(list)))
}

pub fn router(_deployment: &Deployment) -> Router<Deployment> {
    Router::new().nest(
        "/workflows",
        Router::new()
            .route("/definition", get(get_definition))
            .route("/line-items/bulk", put(bulk_update_line_items))
            .route("/alerts", get(get_alerts)),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use db::models::workflow::WorkflowLineItem;
    use serde_json::json;
    use uuid::Uuid;

    use crate::routes::test_support::{app, send};

    #[tokio::test]
    async fn test_definition_lists_phases_in_order() {
        let (app, _db) = app().await;
        let (status, body) = send(&app, "GET", "/api/workflows/definition", None).await;
        assert_eq!(status, StatusCode::OK);
        let phases = body["data"]["phases"].as_array().unwrap();
        assert_eq!(phases[0]["phaseType"], "LEAD");
        assert_eq!(phases[0]["steps"][0]["stepId"], "LEAD-1");
        assert_eq!(phases.last().unwrap()["phaseType"], "COMPLETION");

        // Catalog rows use the same field casing as the rest of the API
        let line_item = &phases[0]["steps"][0]["lineItems"][0];
        assert!(line_item["itemName"].is_string());
        assert!(line_item["alertDays"].is_i64());
        assert!(line_item.get("item_name").is_none());
    }

    #[tokio::test]
    async fn test_bulk_rename() {
        let (app, db) = app().await;
        let items = WorkflowLineItem::find_all(&db.pool).await.unwrap();

        let (status, body) = send(
            &app,
            "PUT",
            "/api/workflows/line-items/bulk",
            Some(json!({
                "updates": [
                    { "id": items[0].id, "itemName": "Call homeowner" },
                    { "id": items[1].id, "itemName": "Email homeowner" }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["updated"], 2);

        let renamed = WorkflowLineItem::find_by_id(&db.pool, items[1].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.item_name, "Email homeowner");
    }

    #[tokio::test]
    async fn test_bulk_rename_rejects_unknown_ids_atomically() {
        let (app, db) = app().await;
        let items = WorkflowLineItem::find_all(&db.pool).await.unwrap();

        let (status, body) = send(
            &app,
            "PUT",
            "/api/workflows/line-items/bulk",
            Some(json!({
                "updates": [
                    { "id": items[0].id, "itemName": "Call homeowner" },
                    { "id": Uuid::new_v4(), "itemName": "Ghost" }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let unchanged = WorkflowLineItem::find_by_id(&db.pool, items[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.item_name, items[0].item_name);
    }

    #[tokio::test]
    async fn test_bulk_rename_rejects_empty_names() {
        let (app, db) = app().await;
        let items = WorkflowLineItem::find_all(&db.pool).await.unwrap();
        let (status, _) = send(
            &app,
            "PUT",
            "/api/workflows/line-items/bulk",
            Some(json!({ "updates": [{ "id": items[0].id, "itemName": "" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_alerts_empty_by_default() {
        let (app, _db) = app().await;
        let (status, body) = send(&app, "GET", "/api/workflows/alerts?limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["alerts"].as_array().unwrap().len(), 0);
        assert_eq!(body["data"]["malformed"], 0);
    }
}

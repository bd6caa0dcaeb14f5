use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unknown notification type: {0}")]
    UnknownType(String),
    #[error("invalid action data for {kind}: {source}")]
    InvalidActionData {
        kind: NotificationType,
        #[source]
        source: serde_json::Error,
    },
}

/// Discriminator stored in the `type` column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    WorkflowAlert,
    PhaseAdvanced,
    WorkflowCompleted,
}

/// An overdue line item on a project's workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAlertData {
    pub project_id: Uuid,
    pub project_name: String,
    pub project_number: i64,
    pub tracker_id: Uuid,
    pub phase_name: String,
    pub step_id: String,
    pub step_name: String,
    pub line_item_id: Uuid,
    pub line_item_name: String,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct PhaseAdvancedData {
    pub project_id: Uuid,
    pub project_name: String,
    pub from_phase: Option<String>,
    pub to_phase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCompletedData {
    pub project_id: Uuid,
    pub project_name: String,
    pub total_line_items: i64,
}

/// Typed payload of a notification, keyed by its type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", content = "actionData", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPayload {
    WorkflowAlert(WorkflowAlertData),
    PhaseAdvanced(PhaseAdvancedData),
    WorkflowCompleted(WorkflowCompletedData),
}

impl NotificationPayload {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            Self::WorkflowAlert(_) => NotificationType::WorkflowAlert,
            Self::PhaseAdvanced(_) => NotificationType::PhaseAdvanced,
            Self::WorkflowCompleted(_) => NotificationType::WorkflowCompleted,
        }
    }

    pub fn project_id(&self) -> Uuid {
        match self {
            Self::WorkflowAlert(data) => data.project_id,
            Self::PhaseAdvanced(data) => data.project_id,
            Self::WorkflowCompleted(data) => data.project_id,
        }
    }

    fn action_data_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::WorkflowAlert(data) => serde_json::to_string(data),
            Self::PhaseAdvanced(data) => serde_json::to_string(data),
            Self::WorkflowCompleted(data) => serde_json::to_string(data),
        }
    }

    fn from_parts(kind: NotificationType, action_data: &str) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            NotificationType::WorkflowAlert => Self::WorkflowAlert(serde_json::from_str(action_data)?),
            NotificationType::PhaseAdvanced => Self::PhaseAdvanced(serde_json::from_str(action_data)?),
            NotificationType::WorkflowCompleted => {
                Self::WorkflowCompleted(serde_json::from_str(action_data)?)
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub payload: NotificationPayload,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub recipient_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub payload: NotificationPayload,
}

/// Row as stored; `action_data` is JSON whose shape depends on `notification_type`
#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    project_id: Option<Uuid>,
    recipient_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    notification_type: String,
    title: String,
    message: String,
    action_data: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = NotificationError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind: NotificationType = row
            .notification_type
            .parse()
            .map_err(|_| NotificationError::UnknownType(row.notification_type.clone()))?;
        let payload = NotificationPayload::from_parts(kind, &row.action_data)
            .map_err(|source| NotificationError::InvalidActionData { kind, source })?;

        Ok(Notification {
            id: row.id,
            project_id: row.project_id,
            recipient_id: row.recipient_id,
            title: row.title,
            message: row.message,
            payload,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, project_id, recipient_id, type, title, message, action_data, is_read, created_at";

impl Notification {
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateNotification,
    ) -> Result<Self, NotificationError> {
        let kind = data.payload.notification_type();
        let action_data = data
            .payload
            .action_data_json()
            .map_err(|source| NotificationError::InvalidActionData { kind, source })?;

        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"INSERT INTO notifications (id, project_id, recipient_id, type, title, message, action_data, is_read, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8)
               RETURNING {NOTIFICATION_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(data.payload.project_id())
        .bind(data.recipient_id)
        .bind(kind.to_string())
        .bind(&data.title)
        .bind(&data.message)
        .bind(action_data)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        row.try_into()
    }

    /// Most recent notifications of one type, newest first
    pub async fn find_by_type(
        pool: &SqlitePool,
        kind: NotificationType,
        limit: i64,
    ) -> Result<Vec<Self>, NotificationError> {
        Self::decode_by_type(pool, kind, limit)
            .await?
            .into_iter()
            .collect()
    }

    /// Like [`Notification::find_by_type`], but a row whose action data does
    /// not decode is returned as an error entry instead of failing the whole read
    pub async fn decode_by_type(
        pool: &SqlitePool,
        kind: NotificationType,
        limit: i64,
    ) -> Result<Vec<Result<Self, NotificationError>>, sqlx::Error> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"SELECT {NOTIFICATION_COLUMNS}
               FROM notifications
               WHERE type = $1
               ORDER BY created_at DESC
               LIMIT $2"#
        ))
        .bind(kind.to_string())
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Notification::try_from).collect())
    }

    pub async fn find_unread_by_project_id(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, NotificationError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"SELECT {NOTIFICATION_COLUMNS}
               FROM notifications
               WHERE project_id = $1 AND is_read = 0
               ORDER BY created_at DESC"#
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    /// Whether an unread alert already exists for this tracker's line item
    pub async fn has_unread_alert(
        pool: &SqlitePool,
        tracker_id: Uuid,
        line_item_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*)
               FROM notifications
               WHERE type = $1
                 AND is_read = 0
                 AND json_extract(action_data, '$.trackerId') = $2
                 AND json_extract(action_data, '$.lineItemId') = $3"#,
        )
        .bind(NotificationType::WorkflowAlert.to_string())
        .bind(tracker_id.to_string())
        .bind(line_item_id.to_string())
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn mark_read(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::project::{CreateProject, Project},
    };

    fn alert_for(project: &Project, tracker_id: Uuid, line_item_id: Uuid) -> CreateNotification {
        CreateNotification {
            recipient_id: None,
            title: "Workflow alert".to_string(),
            message: "Schedule inspection is overdue".to_string(),
            payload: NotificationPayload::WorkflowAlert(WorkflowAlertData {
                project_id: project.id,
                project_name: project.project_name.clone(),
                project_number: project.project_number,
                tracker_id,
                phase_name: "Lead".to_string(),
                step_id: "LEAD-1".to_string(),
                step_name: "Intake".to_string(),
                line_item_id,
                line_item_name: "Schedule inspection".to_string(),
                days_overdue: 2,
            }),
        }
    }

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let payload = NotificationPayload::WorkflowCompleted(WorkflowCompletedData {
            project_id: Uuid::nil(),
            project_name: "Birch Rd".to_string(),
            total_line_items: 12,
        });
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "WORKFLOW_COMPLETED");
        assert_eq!(value["actionData"]["projectName"], "Birch Rd");
        assert_eq!(value["actionData"]["totalLineItems"], 12);
    }

    #[test]
    fn test_notification_type_round_trips_through_strum() {
        assert_eq!(NotificationType::WorkflowAlert.to_string(), "WORKFLOW_ALERT");
        assert_eq!(
            "PHASE_ADVANCED".parse::<NotificationType>().unwrap(),
            NotificationType::PhaseAdvanced
        );
    }

    #[tokio::test]
    async fn test_create_and_find_alerts() {
        let db = DBService::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let project = Project::create(
            &db.pool,
            &CreateProject::new(300, "Cedar Ct"),
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let tracker_id = Uuid::new_v4();
        let line_item_id = Uuid::new_v4();

        assert!(
            !Notification::has_unread_alert(&db.pool, tracker_id, line_item_id)
                .await
                .unwrap()
        );

        let created = Notification::create(&db.pool, &alert_for(&project, tracker_id, line_item_id))
            .await
            .unwrap();
        assert_eq!(created.project_id, Some(project.id));

        let alerts = Notification::find_by_type(&db.pool, NotificationType::WorkflowAlert, 10)
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        match &alerts[0].payload {
            NotificationPayload::WorkflowAlert(data) => {
                assert_eq!(data.project_name, "Cedar Ct");
                assert_eq!(data.line_item_id, line_item_id);
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        assert!(
            Notification::has_unread_alert(&db.pool, tracker_id, line_item_id)
                .await
                .unwrap()
        );
        Notification::mark_read(&db.pool, created.id).await.unwrap();
        assert!(
            !Notification::has_unread_alert(&db.pool, tracker_id, line_item_id)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_type_is_reported() {
        let db = DBService::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        sqlx::query(
            "INSERT INTO notifications (id, type, title, message, action_data, created_at) VALUES ($1, 'CREW_MESSAGE', 't', 'm', '{}', $2)",
        )
        .bind(Uuid::new_v4())
        .bind(Utc::now())
        .execute(&db.pool)
        .await
        .unwrap();

        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications"
        ))
        .fetch_all(&db.pool)
        .await
        .unwrap();
        let decoded = Notification::try_from(rows.into_iter().next().unwrap());
        assert!(matches!(decoded, Err(NotificationError::UnknownType(t)) if t == "CREW_MESSAGE"));
    }

    #[tokio::test]
    async fn test_decode_by_type_keeps_malformed_rows_separate() {
        let db = DBService::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        sqlx::query(
            "INSERT INTO notifications (id, type, title, message, action_data, created_at) VALUES ($1, 'WORKFLOW_ALERT', 't', 'm', '{\"lineItemName\":\"Tear off\"}', $2)",
        )
        .bind(Uuid::new_v4())
        .bind(Utc::now())
        .execute(&db.pool)
        .await
        .unwrap();

        let decoded = Notification::decode_by_type(&db.pool, NotificationType::WorkflowAlert, 10)
            .await
            .unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(matches!(
            decoded[0],
            Err(NotificationError::InvalidActionData {
                kind: NotificationType::WorkflowAlert,
                ..
            })
        ));

        assert!(
            Notification::find_by_type(&db.pool, NotificationType::WorkflowAlert, 10)
                .await
                .is_err()
        );
    }
}

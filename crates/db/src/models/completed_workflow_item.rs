use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// A line item marked done on a tracker. The row existing is what "completed" means.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CompletedWorkflowItem {
    pub id: Uuid,
    pub tracker_id: Uuid,
    pub phase_id: Uuid,
    pub step_id: Uuid,
    pub line_item_id: Uuid,
    pub completed_by: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateCompletedWorkflowItem {
    pub tracker_id: Uuid,
    pub phase_id: Uuid,
    pub step_id: Uuid,
    pub line_item_id: Uuid,
    pub completed_by: Option<String>,
}

impl CompletedWorkflowItem {
    /// Insert a completion unless the line item is already completed on this
    /// tracker. Returns `None` when a row already existed.
    pub async fn create_if_absent(
        pool: &SqlitePool,
        data: &CreateCompletedWorkflowItem,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CompletedWorkflowItem>(
            r#"INSERT INTO completed_workflow_items
                 (id, tracker_id, phase_id, step_id, line_item_id, completed_by, completed_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT(tracker_id, line_item_id) DO NOTHING
               RETURNING id, tracker_id, phase_id, step_id, line_item_id, completed_by, completed_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(data.tracker_id)
        .bind(data.phase_id)
        .bind(data.step_id)
        .bind(data.line_item_id)
        .bind(&data.completed_by)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn count_by_tracker_id(
        pool: &SqlitePool,
        tracker_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM completed_workflow_items WHERE tracker_id = $1",
        )
        .bind(tracker_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_tracker_id(
        pool: &SqlitePool,
        tracker_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CompletedWorkflowItem>(
            r#"SELECT id, tracker_id, phase_id, step_id, line_item_id, completed_by, completed_at
               FROM completed_workflow_items
               WHERE tracker_id = $1
               ORDER BY completed_at ASC"#,
        )
        .bind(tracker_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::{
            project::{CreateProject, Project},
            project_workflow_tracker::{CreateTracker, ProjectWorkflowTracker},
            workflow::{PhaseType, WorkflowLineItem, WorkflowPhase, WorkflowStep},
        },
    };

    #[tokio::test]
    async fn test_completing_twice_keeps_one_row() {
        let db = DBService::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let pool = &db.pool;

        let phase = WorkflowPhase::create(pool, Uuid::new_v4(), PhaseType::Lead, "Lead", 0)
            .await
            .unwrap();
        let step = WorkflowStep::create(pool, Uuid::new_v4(), phase.id, "LEAD-1", "Intake", 0)
            .await
            .unwrap();
        let item =
            WorkflowLineItem::create(pool, Uuid::new_v4(), step.id, "Call customer", None, 1, 0)
                .await
                .unwrap();
        let project = Project::create(pool, &CreateProject::new(11, "Oak Ave"), Uuid::new_v4())
            .await
            .unwrap();
        let tracker = ProjectWorkflowTracker::create(
            pool,
            &CreateTracker {
                project_id: project.id,
                current_phase_id: Some(phase.id),
                current_step_id: Some(step.id),
                current_line_item_id: Some(item.id),
                total_line_items: 1,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let data = CreateCompletedWorkflowItem {
            tracker_id: tracker.id,
            phase_id: phase.id,
            step_id: step.id,
            line_item_id: item.id,
            completed_by: Some("crew-lead".to_string()),
        };

        let first = CompletedWorkflowItem::create_if_absent(pool, &data).await.unwrap();
        assert!(first.is_some());
        let second = CompletedWorkflowItem::create_if_absent(pool, &data).await.unwrap();
        assert!(second.is_none());

        assert_eq!(
            CompletedWorkflowItem::count_by_tracker_id(pool, tracker.id)
                .await
                .unwrap(),
            1
        );

        let rows = CompletedWorkflowItem::find_by_tracker_id(pool, tracker.id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].completed_by.as_deref(), Some("crew-lead"));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Per-project aggregate of workflow position
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWorkflowTracker {
    pub id: Uuid,
    pub project_id: Uuid,
    pub current_phase_id: Option<Uuid>,
    pub current_step_id: Option<Uuid>,
    pub current_line_item_id: Option<Uuid>, // None once every line item is completed
    pub total_line_items: i64,              // Denormalized count captured at initialization
    pub phase_started_at: Option<DateTime<Utc>>,
    pub line_item_started_at: Option<DateTime<Utc>>, // When the active line item became active (alerting)
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTracker {
    pub project_id: Uuid,
    pub current_phase_id: Option<Uuid>,
    pub current_step_id: Option<Uuid>,
    pub current_line_item_id: Option<Uuid>,
    pub total_line_items: i64,
}

/// New position of a tracker after a line item changes state
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerPosition {
    pub phase_id: Option<Uuid>,
    pub step_id: Option<Uuid>,
    pub line_item_id: Option<Uuid>,
}

/// Tracker joined with the project fields the scanners report on
#[derive(Debug, Clone, FromRow)]
pub struct ActiveTracker {
    #[sqlx(flatten)]
    pub tracker: ProjectWorkflowTracker,
    pub project_name: String,
    pub project_number: i64,
}

const TRACKER_COLUMNS: &str = "id, project_id, current_phase_id, current_step_id, current_line_item_id, total_line_items, phase_started_at, line_item_started_at, created_at, updated_at";

impl ProjectWorkflowTracker {
    /// Every tracker row for a project, oldest first.
    ///
    /// The unique index makes more than one row impossible on databases we
    /// migrated ourselves, but adopted legacy databases may still hold
    /// duplicates, so multiplicity is left for the caller to judge.
    pub async fn find_by_project_id(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectWorkflowTracker>(&format!(
            r#"SELECT {TRACKER_COLUMNS}
               FROM project_workflow_trackers
               WHERE project_id = $1
               ORDER BY created_at ASC, rowid ASC"#
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Every tracker, archived projects included
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectWorkflowTracker>(&format!(
            "SELECT {TRACKER_COLUMNS} FROM project_workflow_trackers ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(pool)
        .await
    }

    /// Trackers of projects that are neither archived nor completed, with
    /// project identity for reporting
    pub async fn find_active(pool: &SqlitePool) -> Result<Vec<ActiveTracker>, sqlx::Error> {
        sqlx::query_as::<_, ActiveTracker>(
            r#"SELECT
                t.id, t.project_id, t.current_phase_id, t.current_step_id, t.current_line_item_id,
                t.total_line_items, t.phase_started_at, t.line_item_started_at,
                t.created_at, t.updated_at,
                p.project_name, p.project_number
               FROM project_workflow_trackers t
               JOIN projects p ON p.id = t.project_id
               WHERE p.archived = 0 AND p.status <> 'completed'
               ORDER BY p.project_number ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateTracker,
        tracker_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, ProjectWorkflowTracker>(&format!(
            r#"INSERT INTO project_workflow_trackers
                 (id, project_id, current_phase_id, current_step_id, current_line_item_id,
                  total_line_items, phase_started_at, line_item_started_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $7, $7)
               RETURNING {TRACKER_COLUMNS}"#
        ))
        .bind(tracker_id)
        .bind(data.project_id)
        .bind(data.current_phase_id)
        .bind(data.current_step_id)
        .bind(data.current_line_item_id)
        .bind(data.total_line_items)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    /// Move the tracker to a new position.
    ///
    /// `phase_started_at` is only reset when the phase actually changes and
    /// `line_item_started_at` only when the active line item changes.
    pub async fn update_position(
        pool: &SqlitePool,
        id: Uuid,
        position: &TrackerPosition,
        now: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProjectWorkflowTracker>(&format!(
            r#"UPDATE project_workflow_trackers
               SET phase_started_at = CASE
                       WHEN current_phase_id IS $2 THEN phase_started_at ELSE $5 END,
                   line_item_started_at = CASE
                       WHEN current_line_item_id IS $4 THEN line_item_started_at ELSE $5 END,
                   current_phase_id = $2,
                   current_step_id = $3,
                   current_line_item_id = $4,
                   updated_at = $5
               WHERE id = $1
               RETURNING {TRACKER_COLUMNS}"#
        ))
        .bind(id)
        .bind(position.phase_id)
        .bind(position.step_id)
        .bind(position.line_item_id)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn update_total_line_items(
        pool: &SqlitePool,
        id: Uuid,
        total_line_items: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE project_workflow_trackers SET total_line_items = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(total_line_items)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }
}

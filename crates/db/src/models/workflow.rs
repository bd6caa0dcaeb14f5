use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Stage of a roofing project, in execution order
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "phase_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseType {
    Lead,
    Prospect,
    Approved,
    Execution,
    SecondSupplement,
    Completion,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPhase {
    pub id: Uuid,
    pub phase_type: PhaseType,
    pub phase_name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: Uuid,
    pub phase_id: Uuid,
    pub step_id: String, // Stable code, e.g. "LEAD-1"
    pub step_name: String,
    pub sort_order: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowLineItem {
    pub id: Uuid,
    pub step_id: Uuid, // Foreign key to WorkflowStep.id, not the step code
    pub item_name: String,
    pub responsible_role: Option<String>,
    pub alert_days: i64,
    pub sort_order: i64,
}

/// One entry of a bulk line item rename
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct LineItemNameUpdate {
    pub id: Uuid,
    pub item_name: String,
}

impl WorkflowPhase {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowPhase>(
            r#"SELECT id, phase_type, phase_name, sort_order
               FROM workflow_phases
               ORDER BY sort_order ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        phase_type: PhaseType,
        phase_name: &str,
        sort_order: i64,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, WorkflowPhase>(
            r#"INSERT INTO workflow_phases (id, phase_type, phase_name, sort_order)
               VALUES ($1, $2, $3, $4)
               RETURNING id, phase_type, phase_name, sort_order"#,
        )
        .bind(id)
        .bind(phase_type)
        .bind(phase_name)
        .bind(sort_order)
        .fetch_one(executor)
        .await
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM workflow_phases")
            .fetch_one(pool)
            .await
    }
}

impl WorkflowStep {
    /// All steps ordered by phase order, then step order
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStep>(
            r#"SELECT s.id, s.phase_id, s.step_id, s.step_name, s.sort_order
               FROM workflow_steps s
               JOIN workflow_phases p ON p.id = s.phase_id
               ORDER BY p.sort_order ASC, s.sort_order ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_step_id(
        pool: &SqlitePool,
        step_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowStep>(
            r#"SELECT id, phase_id, step_id, step_name, sort_order
               FROM workflow_steps
               WHERE step_id = $1"#,
        )
        .bind(step_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        phase_id: Uuid,
        step_id: &str,
        step_name: &str,
        sort_order: i64,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, WorkflowStep>(
            r#"INSERT INTO workflow_steps (id, phase_id, step_id, step_name, sort_order)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, phase_id, step_id, step_name, sort_order"#,
        )
        .bind(id)
        .bind(phase_id)
        .bind(step_id)
        .bind(step_name)
        .bind(sort_order)
        .fetch_one(executor)
        .await
    }
}

impl WorkflowLineItem {
    /// All line items in workflow order (phase, step, item)
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowLineItem>(
            r#"SELECT li.id, li.step_id, li.item_name, li.responsible_role, li.alert_days, li.sort_order
               FROM workflow_line_items li
               JOIN workflow_steps s ON s.id = li.step_id
               JOIN workflow_phases p ON p.id = s.phase_id
               ORDER BY p.sort_order ASC, s.sort_order ASC, li.sort_order ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, WorkflowLineItem>(
            r#"SELECT id, step_id, item_name, responsible_role, alert_days, sort_order
               FROM workflow_line_items
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM workflow_line_items")
            .fetch_one(pool)
            .await
    }

    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        step_id: Uuid,
        item_name: &str,
        responsible_role: Option<&str>,
        alert_days: i64,
        sort_order: i64,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, WorkflowLineItem>(
            r#"INSERT INTO workflow_line_items (id, step_id, item_name, responsible_role, alert_days, sort_order)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, step_id, item_name, responsible_role, alert_days, sort_order"#,
        )
        .bind(id)
        .bind(step_id)
        .bind(item_name)
        .bind(responsible_role)
        .bind(alert_days)
        .bind(sort_order)
        .fetch_one(executor)
        .await
    }

    /// Rename a line item; returns the number of rows touched (0 for an unknown id)
    pub async fn update_item_name<'e, E>(
        executor: E,
        id: Uuid,
        item_name: &str,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE workflow_line_items SET item_name = $2 WHERE id = $1")
            .bind(id)
            .bind(item_name)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}

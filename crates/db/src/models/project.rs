use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Pending,
    Active,
    Completed,
    OnHold,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub project_number: i64,
    pub project_name: String,
    pub customer_name: Option<String>,
    pub status: ProjectStatus,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateProject {
    pub project_number: i64,
    pub project_name: String,
    pub customer_name: Option<String>,
    pub status: Option<ProjectStatus>,
}

impl CreateProject {
    pub fn new(project_number: i64, project_name: impl Into<String>) -> Self {
        Self {
            project_number,
            project_name: project_name.into(),
            customer_name: None,
            status: None,
        }
    }
}

const PROJECT_COLUMNS: &str =
    "id, project_number, project_name, customer_name, status, archived, created_at, updated_at";

impl Project {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// All projects ordered by project number, optionally including archived ones
    pub async fn find_all(
        pool: &SqlitePool,
        include_archived: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"SELECT {PROJECT_COLUMNS}
               FROM projects
               WHERE archived = 0 OR $1
               ORDER BY project_number ASC"#
        ))
        .bind(include_archived)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateProject,
        project_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let status = data.status.clone().unwrap_or_default();
        let now = Utc::now();
        sqlx::query_as::<_, Project>(&format!(
            r#"INSERT INTO projects (id, project_number, project_name, customer_name, status, archived, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
               RETURNING {PROJECT_COLUMNS}"#
        ))
        .bind(project_id)
        .bind(data.project_number)
        .bind(&data.project_name)
        .bind(&data.customer_name)
        .bind(status)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: ProjectStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE projects SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Archiving only hides the project; its tracker and history stay in place
    pub async fn set_archived(
        pool: &SqlitePool,
        id: Uuid,
        archived: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE projects SET archived = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(archived)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    async fn setup() -> DBService {
        let db = DBService::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_create_and_find_project() {
        let db = setup().await;
        let created = Project::create(
            &db.pool,
            &CreateProject::new(1042, "Hendricks Roof Replacement"),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        assert_eq!(created.status, ProjectStatus::Pending);
        assert!(!created.archived);

        let by_id = Project::find_by_id(&db.pool, created.id).await.unwrap().unwrap();
        assert_eq!(by_id.project_name, "Hendricks Roof Replacement");
        assert_eq!(by_id.project_number, 1042);
    }

    #[tokio::test]
    async fn test_find_all_skips_archived_unless_asked() {
        let db = setup().await;
        let kept = Project::create(&db.pool, &CreateProject::new(1, "Kept"), Uuid::new_v4())
            .await
            .unwrap();
        let archived = Project::create(&db.pool, &CreateProject::new(2, "Old"), Uuid::new_v4())
            .await
            .unwrap();
        Project::set_archived(&db.pool, archived.id, true).await.unwrap();

        let active = Project::find_all(&db.pool, false).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, kept.id);

        let all = Project::find_all(&db.pool, true).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}

use std::{str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    migrate::{MigrateError, Migrator},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use thiserror::Error;
use tracing::{debug, info};

pub mod models;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum DBServiceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] MigrateError),
    /// The database already holds tables but was never migrated by us, so
    /// there is no baseline to apply migrations on top of.
    #[error("database schema is not empty ({} existing tables, no migration history)", tables.len())]
    SchemaNotEmpty { tables: Vec<String> },
}

impl DBServiceError {
    pub fn is_schema_not_empty(&self) -> bool {
        matches!(self, Self::SchemaNotEmpty { .. })
    }
}

/// Outcome of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub newly_applied: usize,
    pub total_applied: usize,
}

/// Handle to the workflow database. Cheap to clone; every clone shares one pool.
#[derive(Clone, Debug)]
pub struct DBService {
    pub pool: SqlitePool,
}

impl DBService {
    pub async fn connect(database_url: &str) -> Result<Self, DBServiceError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        debug!(database_url, "Connected to workflow database");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database, used by tests and dry runs.
    pub async fn new_in_memory() -> Result<Self, DBServiceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // An in-memory database lives exactly as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Apply pending migrations.
    ///
    /// Refuses with [`DBServiceError::SchemaNotEmpty`] when the database has
    /// tables but no `_sqlx_migrations` history; callers decide whether that
    /// baseline condition is fatal.
    pub async fn migrate(&self) -> Result<MigrationReport, DBServiceError> {
        let has_history = self.table_exists("_sqlx_migrations").await?;

        if !has_history {
            let tables = self.user_tables().await?;
            if !tables.is_empty() {
                return Err(DBServiceError::SchemaNotEmpty { tables });
            }
        }

        let before = if has_history {
            self.applied_migrations().await?
        } else {
            0
        };

        MIGRATOR.run(&self.pool).await?;

        let after = self.applied_migrations().await?;
        let report = MigrationReport {
            newly_applied: after.saturating_sub(before),
            total_applied: after,
        };

        info!(
            newly_applied = report.newly_applied,
            total_applied = report.total_applied,
            "Database migrations complete"
        );
        Ok(report)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn table_exists(&self, name: &str) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn user_tables(&self) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"SELECT name FROM sqlite_master
               WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
               ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn applied_migrations(&self) -> Result<usize, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_fresh_database() {
        let db = DBService::new_in_memory().await.unwrap();
        let report = db.migrate().await.unwrap();
        assert!(report.newly_applied >= 1);
        assert_eq!(report.newly_applied, report.total_applied);

        let again = db.migrate().await.unwrap();
        assert_eq!(again.newly_applied, 0);
        assert_eq!(again.total_applied, report.total_applied);
    }

    #[tokio::test]
    async fn test_migrate_refuses_unmanaged_schema() {
        let db = DBService::new_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE legacy_projects (id INTEGER PRIMARY KEY)")
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.migrate().await.unwrap_err();
        assert!(err.is_schema_not_empty());
        match err {
            DBServiceError::SchemaNotEmpty { tables } => {
                assert_eq!(tables, vec!["legacy_projects".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

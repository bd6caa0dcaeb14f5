//! Database validation: schema readiness and workflow catalog / tracker integrity

use std::collections::HashMap;

use db::models::project_workflow_tracker::ProjectWorkflowTracker;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::workflow_definition::WorkflowDefinition;

pub const REQUIRED_TABLES: &[&str] = &[
    "projects",
    "workflow_phases",
    "workflow_steps",
    "workflow_line_items",
    "project_workflow_trackers",
    "completed_workflow_items",
    "notifications",
];

#[derive(Debug, Error)]
pub enum DatabaseValidationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of database validation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_initialized: bool,
    pub migrations_applied: usize,
    pub missing_tables: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.is_initialized && self.missing_tables.is_empty() && self.warnings.is_empty()
    }

    pub fn summary(&self) -> String {
        if !self.is_initialized {
            "Database not initialized - migrations need to be run".to_string()
        } else if !self.missing_tables.is_empty() {
            format!("Database is missing tables: {}", self.missing_tables.join(", "))
        } else if !self.warnings.is_empty() {
            format!("Database validation warnings: {}", self.warnings.join(", "))
        } else {
            format!("Database OK - {} migrations applied", self.migrations_applied)
        }
    }
}

/// One row of the step id listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepIdEntry {
    pub phase_name: String,
    pub step_id: String,
    pub step_name: String,
    pub line_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WorkflowIssue {
    MalformedStepId { step_id: String },
    EmptyStep { step_id: String },
    UnknownCurrentPhase { tracker_id: Uuid, phase_id: Uuid },
    UnknownCurrentLineItem { tracker_id: Uuid, line_item_id: Uuid },
    StaleLineItemTotal { tracker_id: Uuid, stored: i64, expected: i64 },
    DuplicateTrackers { project_id: Uuid, count: usize },
}

impl std::fmt::Display for WorkflowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedStepId { step_id } => write!(f, "step id {step_id:?} is not PREFIX-N"),
            Self::EmptyStep { step_id } => write!(f, "step {step_id} has no line items"),
            Self::UnknownCurrentPhase { tracker_id, phase_id } => {
                write!(f, "tracker {tracker_id} points at unknown phase {phase_id}")
            }
            Self::UnknownCurrentLineItem { tracker_id, line_item_id } => {
                write!(f, "tracker {tracker_id} points at unknown line item {line_item_id}")
            }
            Self::StaleLineItemTotal { tracker_id, stored, expected } => write!(
                f,
                "tracker {tracker_id} expects {stored} line items, workflow has {expected}"
            ),
            Self::DuplicateTrackers { project_id, count } => {
                write!(f, "project {project_id} has {count} trackers")
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowAudit {
    pub steps: Vec<StepIdEntry>,
    pub issues: Vec<WorkflowIssue>,
}

/// Step codes look like `LEAD-1` / `SUPP-4`: an upper-case prefix, a dash and a number
pub fn is_well_formed_step_id(step_id: &str) -> bool {
    match step_id.rsplit_once('-') {
        Some((prefix, number)) => {
            !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Database validator for ensuring schema and workflow data are consistent
pub struct DatabaseValidator {
    pool: SqlitePool,
}

impl DatabaseValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Check if the database is initialized and the workflow tables exist
    pub async fn validate(&self) -> Result<ValidationResult, DatabaseValidationError> {
        let missing_tables = self.missing_tables(REQUIRED_TABLES).await?;

        if !self.table_exists("_sqlx_migrations").await? {
            warn!("Database not initialized - _sqlx_migrations table does not exist");
            return Ok(ValidationResult {
                is_initialized: false,
                migrations_applied: 0,
                missing_tables,
                warnings: vec!["Database has not been initialized. Run migrations.".to_string()],
            });
        }

        let migrations_applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        let mut warnings = Vec::new();
        let failed = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 0",
        )
        .fetch_one(&self.pool)
        .await?;
        if failed > 0 {
            warnings.push(format!("{failed} migration(s) recorded as failed"));
        }

        info!(migrations_applied, "Database validation complete");

        Ok(ValidationResult {
            is_initialized: true,
            migrations_applied: migrations_applied as usize,
            missing_tables,
            warnings,
        })
    }

    /// List every step id and check the catalog and trackers against each other
    pub async fn audit_workflow(&self) -> Result<WorkflowAudit, DatabaseValidationError> {
        let definition = WorkflowDefinition::load(&self.pool).await?;
        let mut audit = WorkflowAudit::default();

        for phase in &definition.phases {
            for step in &phase.steps {
                audit.steps.push(StepIdEntry {
                    phase_name: phase.phase.phase_name.clone(),
                    step_id: step.step.step_id.clone(),
                    step_name: step.step.step_name.clone(),
                    line_items: step.line_items.len(),
                });
                if !is_well_formed_step_id(&step.step.step_id) {
                    audit.issues.push(WorkflowIssue::MalformedStepId {
                        step_id: step.step.step_id.clone(),
                    });
                }
                if step.line_items.is_empty() {
                    audit.issues.push(WorkflowIssue::EmptyStep {
                        step_id: step.step.step_id.clone(),
                    });
                }
            }
        }

        let trackers = ProjectWorkflowTracker::find_all(&self.pool).await?;

        let expected_total = definition.total_line_items();
        let mut per_project: HashMap<Uuid, usize> = HashMap::new();
        for tracker in &trackers {
            *per_project.entry(tracker.project_id).or_default() += 1;

            if let Some(phase_id) = tracker.current_phase_id {
                if definition.phase(phase_id).is_none() {
                    audit.issues.push(WorkflowIssue::UnknownCurrentPhase {
                        tracker_id: tracker.id,
                        phase_id,
                    });
                }
            }
            if let Some(line_item_id) = tracker.current_line_item_id {
                if definition.locate(line_item_id).is_none() {
                    audit.issues.push(WorkflowIssue::UnknownCurrentLineItem {
                        tracker_id: tracker.id,
                        line_item_id,
                    });
                }
            }
            if tracker.total_line_items != expected_total {
                audit.issues.push(WorkflowIssue::StaleLineItemTotal {
                    tracker_id: tracker.id,
                    stored: tracker.total_line_items,
                    expected: expected_total,
                });
            }
        }

        let mut duplicates: Vec<_> = per_project
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .collect();
        duplicates.sort();
        audit.issues.extend(
            duplicates
                .into_iter()
                .map(|(project_id, count)| WorkflowIssue::DuplicateTrackers { project_id, count }),
        );

        Ok(audit)
    }

    async fn missing_tables(
        &self,
        required_tables: &[&str],
    ) -> Result<Vec<String>, DatabaseValidationError> {
        let mut missing_tables = Vec::new();
        for table in required_tables {
            if !self.table_exists(table).await? {
                missing_tables.push(table.to_string());
            }
        }
        Ok(missing_tables)
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
}

use std::io::Write;

use anyhow::{Context, bail};
use chrono::Utc;
use db::{
    DBService,
    models::{
        notification::{Notification, NotificationPayload, NotificationType},
        project::Project,
    },
};
use services::services::{
    database_validator::DatabaseValidator,
    workflow_alerts::{AlertScanReport, WorkflowAlertService},
    workflow_definition::{WorkflowDefinition, seed_default_catalog},
    workflow_progress::{ProjectWorkflowStatus, WorkflowProgressService},
};
use tracing::{info, warn};

use crate::Command;

const ALERT_LIMIT: i64 = 50;

pub async fn execute(command: Command, db: &DBService, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Migrate => migrate(db, out).await,
        Command::CheckTrackers => check_trackers(db, out).await,
        Command::VerifyAlerts => verify_alerts(db, out).await,
        Command::CheckStepIds => check_step_ids(db, out).await,
        Command::ScanAlerts => scan_alerts(db, out).await,
    }
}

async fn migrate(db: &DBService, out: &mut impl Write) -> anyhow::Result<()> {
    match db.migrate().await {
        Ok(report) => writeln!(
            out,
            "✅ Migrations applied: {} new, {} total",
            report.newly_applied, report.total_applied
        )?,
        Err(e) if e.is_schema_not_empty() => {
            warn!("{}", e);
            writeln!(out, "⚠️  Schema not empty; keeping the existing schema as the baseline")?;
            return Ok(());
        }
        Err(e) => return Err(e).context("migration failed"),
    }

    if seed_default_catalog(&db.pool).await? {
        writeln!(out, "✅ Seeded the default workflow catalog")?;
    }
    Ok(())
}

async fn check_trackers(db: &DBService, out: &mut impl Write) -> anyhow::Result<()> {
    let projects = Project::find_all(&db.pool, true).await?;
    let definition = WorkflowDefinition::load(&db.pool).await?;
    let service = WorkflowProgressService::new(db.clone());

    writeln!(out, "Checking workflow trackers for {} project(s)", projects.len())?;
    let mut untracked = 0;
    for project in &projects {
        let status = service
            .status_with_definition(&definition, project.id)
            .await
            .with_context(|| {
                format!("failed to read tracker of project #{}", project.project_number)
            })?;
        if matches!(status, ProjectWorkflowStatus::NoTracker) {
            untracked += 1;
        }
        writeln!(out, "{}", tracker_line(project, &status))?;
    }

    writeln!(
        out,
        "{} tracked, {} without tracker",
        projects.len() - untracked,
        untracked
    )?;
    Ok(())
}

pub fn tracker_line(project: &Project, status: &ProjectWorkflowStatus) -> String {
    let archived = if project.archived { " (archived)" } else { "" };
    format!(
        "#{} {} [{}]{}: {}",
        project.project_number, project.project_name, project.status, archived, status
    )
}

async fn verify_alerts(db: &DBService, out: &mut impl Write) -> anyhow::Result<()> {
    let rows =
        Notification::decode_by_type(&db.pool, NotificationType::WorkflowAlert, ALERT_LIMIT)
            .await?;

    writeln!(out, "Found {} WORKFLOW_ALERT notification(s)", rows.len())?;
    let mut malformed = 0;
    for row in &rows {
        match row {
            Ok(alert) => writeln!(out, "{}", alert_line(alert))?,
            Err(e) => {
                malformed += 1;
                writeln!(out, "  ✗ unreadable alert: {}", e)?;
            }
        }
    }

    if malformed > 0 {
        bail!("{} alert(s) have malformed action data", malformed);
    }
    Ok(())
}

pub fn alert_line(alert: &Notification) -> String {
    let read = if alert.is_read { "read" } else { "unread" };
    match &alert.payload {
        NotificationPayload::WorkflowAlert(data) => format!(
            "  ✓ {} | #{} {} | {} {} | {} day(s) overdue | {} | {}",
            alert.created_at.format("%Y-%m-%d %H:%M"),
            data.project_number,
            data.project_name,
            data.step_id,
            data.line_item_name,
            data.days_overdue,
            read,
            alert.title
        ),
        other => format!("  ? {} has unexpected payload {}", alert.id, other.notification_type()),
    }
}

async fn check_step_ids(db: &DBService, out: &mut impl Write) -> anyhow::Result<()> {
    let validator = DatabaseValidator::new(db.pool.clone());
    let validation = validator.validate().await?;
    writeln!(out, "{}", validation.summary())?;

    let audit = validator.audit_workflow().await?;
    let mut phase = None;
    for step in &audit.steps {
        if phase != Some(&step.phase_name) {
            writeln!(out, "{}", step.phase_name)?;
            phase = Some(&step.phase_name);
        }
        writeln!(
            out,
            "  {:<14} {} ({} line item(s))",
            step.step_id, step.step_name, step.line_items
        )?;
    }

    for issue in &audit.issues {
        writeln!(out, "  ✗ {}", issue)?;
    }
    if !audit.issues.is_empty() {
        bail!("{} workflow integrity issue(s) found", audit.issues.len());
    }
    writeln!(out, "✅ {} step id(s) checked, no issues", audit.steps.len())?;
    Ok(())
}

async fn scan_alerts(db: &DBService, out: &mut impl Write) -> anyhow::Result<()> {
    let report = WorkflowAlertService::scan(&db.pool, Utc::now()).await?;
    info!(alerts = report.alerts_created, "Alert scan complete");
    writeln!(out, "{}", scan_summary(&report))?;
    if report.failed > 0 {
        bail!("{} tracker(s) could not be checked", report.failed);
    }
    Ok(())
}

pub fn scan_summary(report: &AlertScanReport) -> String {
    format!(
        "Scanned {} tracker(s): {} new alert(s), {} already alerted, {} failed",
        report.trackers_scanned, report.alerts_created, report.already_alerted, report.failed
    )
}

#[cfg(test)]
mod tests {
    use db::models::project::CreateProject;
    use uuid::Uuid;

    use super::*;

    async fn migrated() -> DBService {
        let db = DBService::new_in_memory().await.unwrap();
        let mut out = Vec::new();
        execute(Command::Migrate, &db, &mut out).await.unwrap();
        db
    }

    async fn run(command: Command, db: &DBService) -> (anyhow::Result<()>, String) {
        let mut out = Vec::new();
        let result = execute(command, db, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_migrate_seeds_and_is_repeatable() {
        let db = migrated().await;
        let (result, output) = run(Command::Migrate, &db).await;
        result.unwrap();
        assert!(output.contains("0 new"));
        assert!(!output.contains("Seeded"));
    }

    #[tokio::test]
    async fn test_migrate_accepts_unmanaged_schema() {
        let db = DBService::new_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE legacy_projects (id TEXT PRIMARY KEY)")
            .execute(&db.pool)
            .await
            .unwrap();

        let (result, output) = run(Command::Migrate, &db).await;
        result.unwrap();
        assert!(output.contains("Schema not empty"));
    }

    #[tokio::test]
    async fn test_check_trackers_marks_untracked_projects() {
        let db = migrated().await;
        let tracked = Project::create(&db.pool, &CreateProject::new(1001, "Smith"), Uuid::new_v4())
            .await
            .unwrap();
        Project::create(&db.pool, &CreateProject::new(1002, "Jones"), Uuid::new_v4())
            .await
            .unwrap();
        WorkflowProgressService::new(db.clone())
            .initialize_project(tracked.id)
            .await
            .unwrap();

        let (result, output) = run(Command::CheckTrackers, &db).await;
        result.unwrap();
        assert!(output.contains("#1001 Smith [active]: 0% (0/"));
        assert!(output.contains("#1002 Jones [pending]: NO TRACKER"));
        assert!(output.contains("1 tracked, 1 without tracker"));
    }

    #[tokio::test]
    async fn test_scan_and_verify_alerts() {
        let db = migrated().await;
        let project = Project::create(&db.pool, &CreateProject::new(2001, "Garcia"), Uuid::new_v4())
            .await
            .unwrap();
        WorkflowProgressService::new(db.clone())
            .initialize_project(project.id)
            .await
            .unwrap();

        // Nothing is overdue right after initialization
        let (result, output) = run(Command::ScanAlerts, &db).await;
        result.unwrap();
        assert!(output.contains("Scanned 1 tracker(s): 0 new alert(s)"));

        WorkflowAlertService::scan(&db.pool, Utc::now() + chrono::Duration::days(3))
            .await
            .unwrap();
        let (result, output) = run(Command::VerifyAlerts, &db).await;
        result.unwrap();
        assert!(output.contains("Found 1 WORKFLOW_ALERT notification(s)"));
        assert!(output.contains("#2001 Garcia | LEAD-1"));
    }

    #[tokio::test]
    async fn test_check_step_ids_clean_catalog() {
        let db = migrated().await;
        let (result, output) = run(Command::CheckStepIds, &db).await;
        result.unwrap();
        assert!(output.contains("LEAD-1"));
        assert!(output.contains("no issues"));
    }
}

//! Service for raising WORKFLOW_ALERT notifications on overdue line items.

use std::time::Duration;

use chrono::{DateTime, Utc};
use db::{
    DBService,
    models::{
        notification::{
            CreateNotification, Notification, NotificationError, NotificationPayload,
            WorkflowAlertData,
        },
        project_workflow_tracker::{ActiveTracker, ProjectWorkflowTracker},
    },
};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::workflow_definition::WorkflowDefinition;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error)]
pub enum WorkflowAlertError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Notification(#[from] NotificationError),
}

/// Counts from one pass over the active trackers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertScanReport {
    pub trackers_scanned: usize,
    pub alerts_created: usize,
    pub already_alerted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerCheck {
    Idle,
    NotDue,
    AlreadyAlerted,
    Alerted,
}

/// Whole days (rounded up, at least 1) a line item is past its allowance,
/// or `None` while it is still within `alert_days` of `started_at`
pub fn overdue_days(started_at: DateTime<Utc>, alert_days: i64, now: DateTime<Utc>) -> Option<i64> {
    let deadline = started_at + chrono::Duration::days(alert_days.max(0));
    let overdue = (now - deadline).num_seconds();
    if overdue <= 0 {
        return None;
    }
    Some(((overdue + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY).max(1))
}

/// Background service that periodically scans trackers for overdue line items
pub struct WorkflowAlertService {
    db: DBService,
    poll_interval: Duration,
}

impl WorkflowAlertService {
    /// Spawn the background alert scanner
    pub async fn spawn(db: DBService, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = Self { db, poll_interval };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting workflow alert service with interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            match Self::scan(&self.db.pool, Utc::now()).await {
                Ok(report) if report.alerts_created > 0 || report.failed > 0 => {
                    info!(
                        trackers = report.trackers_scanned,
                        alerts = report.alerts_created,
                        failed = report.failed,
                        "Workflow alert scan finished"
                    );
                }
                Ok(report) => {
                    debug!(trackers = report.trackers_scanned, "Workflow alert scan: nothing overdue");
                }
                Err(e) => error!("Error scanning for overdue workflow items: {}", e),
            }
        }
    }

    /// Evaluate every tracker of an open project (not archived, not completed) once, as of `now`.
    ///
    /// A tracker that fails is logged and counted, and the scan moves on.
    pub async fn scan(
        pool: &SqlitePool,
        now: DateTime<Utc>,
    ) -> Result<AlertScanReport, WorkflowAlertError> {
        let definition = WorkflowDefinition::load(pool).await?;
        let trackers = ProjectWorkflowTracker::find_active(pool).await?;
        let mut report = AlertScanReport::default();

        for active in &trackers {
            report.trackers_scanned += 1;
            match check_tracker(pool, &definition, active, now).await {
                Ok(TrackerCheck::Alerted) => report.alerts_created += 1,
                Ok(TrackerCheck::AlreadyAlerted) => report.already_alerted += 1,
                Ok(TrackerCheck::Idle | TrackerCheck::NotDue) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        tracker_id = %active.tracker.id,
                        project_id = %active.tracker.project_id,
                        error = %e,
                        "Workflow alert: error checking tracker"
                    );
                }
            }
        }

        Ok(report)
    }
}

async fn check_tracker(
    pool: &SqlitePool,
    definition: &WorkflowDefinition,
    active: &ActiveTracker,
    now: DateTime<Utc>,
) -> Result<TrackerCheck, WorkflowAlertError> {
    let tracker = &active.tracker;
    let Some(line_item_id) = tracker.current_line_item_id else {
        return Ok(TrackerCheck::Idle);
    };
    let Some(item) = definition.locate(line_item_id) else {
        warn!(
            tracker_id = %tracker.id,
            line_item_id = %line_item_id,
            "Workflow alert: tracker points at a line item missing from the workflow"
        );
        return Ok(TrackerCheck::Idle);
    };

    let started_at = tracker
        .line_item_started_at
        .or(tracker.phase_started_at)
        .unwrap_or(tracker.created_at);
    let Some(days_overdue) = overdue_days(started_at, item.line_item.alert_days, now) else {
        return Ok(TrackerCheck::NotDue);
    };

    if Notification::has_unread_alert(pool, tracker.id, line_item_id).await? {
        return Ok(TrackerCheck::AlreadyAlerted);
    }

    info!(
        project_id = %tracker.project_id,
        project_number = active.project_number,
        step = %item.step.step_id,
        days_overdue,
        "Workflow alert: line item overdue"
    );

    Notification::create(
        pool,
        &CreateNotification {
            recipient_id: None,
            title: format!("Overdue: {}", item.line_item.item_name),
            message: format!(
                "{} (#{}) is {} day(s) overdue on {} in {}",
                active.project_name,
                active.project_number,
                days_overdue,
                item.step.step_name,
                item.phase.phase_name
            ),
            payload: NotificationPayload::WorkflowAlert(WorkflowAlertData {
                project_id: tracker.project_id,
                project_name: active.project_name.clone(),
                project_number: active.project_number,
                tracker_id: tracker.id,
                phase_name: item.phase.phase_name.clone(),
                step_id: item.step.step_id.clone(),
                step_name: item.step.step_name.clone(),
                line_item_id,
                line_item_name: item.line_item.item_name.clone(),
                days_overdue,
            }),
        },
    )
    .await?;

    Ok(TrackerCheck::Alerted)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use db::models::{
        notification::NotificationType,
        project::{CreateProject, Project, ProjectStatus},
    };
    use uuid::Uuid;

    use super::*;
    use crate::services::{
        workflow_definition::seed_default_catalog, workflow_progress::WorkflowProgressService,
    };

    async fn setup_initialized(number: i64, name: &str) -> (DBService, Project) {
        let db = DBService::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        seed_default_catalog(&db.pool).await.unwrap();
        let project = add_project(&db, number, name).await;
        (db, project)
    }

    async fn add_project(db: &DBService, number: i64, name: &str) -> Project {
        let project = Project::create(&db.pool, &CreateProject::new(number, name), Uuid::new_v4())
            .await
            .unwrap();
        WorkflowProgressService::new(db.clone())
            .initialize_project(project.id)
            .await
            .unwrap();
        project
    }

    #[test]
    fn test_overdue_days() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        assert_eq!(overdue_days(start, 2, start + chrono::Duration::days(2)), None);
        assert_eq!(
            overdue_days(start, 2, start + chrono::Duration::days(2) + chrono::Duration::minutes(1)),
            Some(1)
        );
        assert_eq!(overdue_days(start, 2, start + chrono::Duration::days(4)), Some(2));
        assert_eq!(
            overdue_days(start, 1, start + chrono::Duration::hours(49)),
            Some(2)
        );
        assert_eq!(overdue_days(start, 0, start + chrono::Duration::seconds(1)), Some(1));
    }

    #[tokio::test]
    async fn test_nothing_due_right_after_initialization() {
        let (db, _project) = setup_initialized(2001, "Garcia Roof").await;
        let report = WorkflowAlertService::scan(&db.pool, Utc::now()).await.unwrap();
        assert_eq!(report.trackers_scanned, 1);
        assert_eq!(report.alerts_created, 0);
    }

    #[tokio::test]
    async fn test_overdue_item_alerts_once() {
        let (db, project) = setup_initialized(2002, "Nguyen Storm Repair").await;
        let later = Utc::now() + chrono::Duration::days(5);

        let first = WorkflowAlertService::scan(&db.pool, later).await.unwrap();
        assert_eq!(first.alerts_created, 1);

        let second = WorkflowAlertService::scan(&db.pool, later).await.unwrap();
        assert_eq!(second.alerts_created, 0);
        assert_eq!(second.already_alerted, 1);

        let alerts = Notification::find_by_type(&db.pool, NotificationType::WorkflowAlert, 10)
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        let NotificationPayload::WorkflowAlert(data) = &alerts[0].payload else {
            panic!("expected an alert payload");
        };
        assert_eq!(data.project_id, project.id);
        assert_eq!(data.project_name, "Nguyen Storm Repair");
        assert_eq!(data.project_number, 2002);
        assert_eq!(data.step_id, "LEAD-1");
        assert!(data.days_overdue >= 4);

        // Once read, a still-overdue item alerts again
        Notification::mark_read(&db.pool, alerts[0].id).await.unwrap();
        let third = WorkflowAlertService::scan(&db.pool, later).await.unwrap();
        assert_eq!(third.alerts_created, 1);
    }

    #[tokio::test]
    async fn test_archived_projects_are_skipped() {
        let (db, project) = setup_initialized(2003, "Old Barn").await;
        add_project(&db, 2004, "Lee Residence").await;
        Project::set_archived(&db.pool, project.id, true).await.unwrap();

        let report = WorkflowAlertService::scan(&db.pool, Utc::now() + chrono::Duration::days(5))
            .await
            .unwrap();
        assert_eq!(report.trackers_scanned, 1);
        assert_eq!(report.alerts_created, 1);

        let tracker = ProjectWorkflowTracker::find_by_project_id(&db.pool, project.id)
            .await
            .unwrap();
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn test_completed_projects_are_skipped() {
        let (db, project) = setup_initialized(2005, "Ortiz Garage").await;
        Project::update_status(&db.pool, project.id, ProjectStatus::Completed)
            .await
            .unwrap();

        // The tracker still points at its first line item
        let tracker = ProjectWorkflowTracker::find_by_project_id(&db.pool, project.id)
            .await
            .unwrap();
        assert!(tracker[0].current_line_item_id.is_some());

        let report = WorkflowAlertService::scan(&db.pool, Utc::now() + chrono::Duration::days(5))
            .await
            .unwrap();
        assert_eq!(report.trackers_scanned, 0);
        assert_eq!(report.alerts_created, 0);
    }
}

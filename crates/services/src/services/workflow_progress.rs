//! Per-project workflow progress: completion percentage, display phase and
//! the completion / initialization commands that move a tracker forward.

use std::{collections::HashSet, fmt};

use chrono::{DateTime, Utc};
use db::{
    DBService,
    models::{
        completed_workflow_item::{CompletedWorkflowItem, CreateCompletedWorkflowItem},
        notification::{
            CreateNotification, Notification, NotificationError, NotificationPayload,
            PhaseAdvancedData, WorkflowCompletedData,
        },
        project::{Project, ProjectStatus},
        project_workflow_tracker::{CreateTracker, ProjectWorkflowTracker, TrackerPosition},
        workflow::{PhaseType, WorkflowLineItem, WorkflowPhase, WorkflowStep},
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::workflow_definition::{LineItemRef, WorkflowDefinition};

#[derive(Debug, Error)]
pub enum WorkflowProgressError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error("project {0} has no workflow tracker")]
    TrackerNotFound(Uuid),
    #[error("line item {0} is not part of the workflow")]
    UnknownLineItem(Uuid),
    #[error("the workflow catalog is empty")]
    EmptyWorkflow,
}

/// Percentage of `completed` over `total`, rounded half-up and clamped to 0..=100.
///
/// A non-positive `total` yields 0.
pub fn completion_percent(completed: i64, total: i64) -> u8 {
    if total <= 0 {
        return 0;
    }
    let completed = completed.clamp(0, total);
    // completed * 100 / total rounded half-up, kept in integers
    let percent = (completed * 200 + total) / (2 * total);
    percent.min(100) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub completed_count: i64,
    pub total_count: i64,
    pub percent: u8,
}

impl CompletionSummary {
    pub fn new(completed_count: i64, total_count: i64) -> Self {
        Self {
            completed_count,
            total_count,
            percent: completion_percent(completed_count, total_count),
        }
    }
}

impl fmt::Display for CompletionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}% ({}/{})",
            self.percent, self.completed_count, self.total_count
        )
    }
}

/// Result of looking a project's tracker up
#[derive(Debug, Clone)]
pub enum TrackerLookup {
    NoTracker,
    Tracked(ProjectWorkflowTracker),
    /// More than one tracker row, oldest first
    Ambiguous(Vec<ProjectWorkflowTracker>),
}

impl TrackerLookup {
    pub fn from_rows(mut rows: Vec<ProjectWorkflowTracker>) -> Self {
        match rows.len() {
            0 => Self::NoTracker,
            1 => Self::Tracked(rows.remove(0)),
            _ => Self::Ambiguous(rows),
        }
    }

    /// The tracker callers should act on: the only one, or the oldest of duplicates
    pub fn into_primary(self, project_id: Uuid) -> Option<ProjectWorkflowTracker> {
        match self {
            Self::NoTracker => None,
            Self::Tracked(tracker) => Some(tracker),
            Self::Ambiguous(trackers) => {
                warn!(
                    project_id = %project_id,
                    count = trackers.len(),
                    "Project has duplicate workflow trackers, using the oldest"
                );
                trackers.into_iter().next()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLineItem {
    pub line_item: WorkflowLineItem,
    pub step_code: String,
    pub step_name: String,
    pub phase_name: String,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step: WorkflowStep,
    pub phase_type: PhaseType,
    pub completed_line_items: i64,
    pub total_line_items: i64,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProgress {
    pub project_id: Uuid,
    pub tracker_id: Uuid,
    pub completion: CompletionSummary,
    pub current_phase: Option<WorkflowPhase>,
    pub active_line_item: Option<ActiveLineItem>,
    pub steps: Vec<StepProgress>,
}

impl WorkflowProgress {
    /// Build a progress view from the stored definition, a tracker and its completion rows
    pub fn compute(
        definition: &WorkflowDefinition,
        tracker: &ProjectWorkflowTracker,
        completed_rows: &[CompletedWorkflowItem],
    ) -> Self {
        let completed: HashSet<Uuid> = completed_rows.iter().map(|c| c.line_item_id).collect();
        let completion = CompletionSummary::new(completed_rows.len() as i64, tracker.total_line_items);
        let first_pending = definition.first_pending(&completed);

        let current_phase = tracker
            .current_phase_id
            .and_then(|id| definition.phase(id))
            .or_else(|| first_pending.map(|r| r.phase))
            .or_else(|| definition.last_phase())
            .cloned();

        let active_line_item = first_pending.map(|r| ActiveLineItem {
            line_item: r.line_item.clone(),
            step_code: r.step.step_id.clone(),
            step_name: r.step.step_name.clone(),
            phase_name: r.phase.phase_name.clone(),
            started_at: (tracker.current_line_item_id == Some(r.line_item.id))
                .then_some(tracker.line_item_started_at)
                .flatten(),
        });

        let steps = definition
            .phases
            .iter()
            .flat_map(|phase| {
                let phase_type = phase.phase.phase_type;
                let completed = &completed;
                phase.steps.iter().map(move |step| {
                    let total = step.line_items.len() as i64;
                    let done = step
                        .line_items
                        .iter()
                        .filter(|li| completed.contains(&li.id))
                        .count() as i64;
                    StepProgress {
                        step: step.step.clone(),
                        phase_type,
                        completed_line_items: done,
                        total_line_items: total,
                        is_completed: total > 0 && done == total,
                    }
                })
            })
            .collect();

        Self {
            project_id: tracker.project_id,
            tracker_id: tracker.id,
            completion,
            current_phase,
            active_line_item,
            steps,
        }
    }
}

/// What a project's workflow looks like to a reader
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "status", content = "progress")]
pub enum ProjectWorkflowStatus {
    #[serde(rename = "NO TRACKER")]
    NoTracker,
    #[serde(rename = "TRACKED")]
    Tracked(WorkflowProgress),
}

impl ProjectWorkflowStatus {
    pub fn progress(&self) -> Option<&WorkflowProgress> {
        match self {
            Self::NoTracker => None,
            Self::Tracked(progress) => Some(progress),
        }
    }
}

impl fmt::Display for ProjectWorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTracker => f.write_str("NO TRACKER"),
            Self::Tracked(progress) => {
                write!(f, "{}", progress.completion)?;
                if let Some(phase) = &progress.current_phase {
                    write!(f, " phase {}", phase.phase_name)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct InitializedWorkflow {
    pub tracker: ProjectWorkflowTracker,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct LineItemCompletion {
    /// False when the line item had already been completed
    pub newly_completed: bool,
    pub phase_advanced: bool,
    pub progress: WorkflowProgress,
}

#[derive(Clone)]
pub struct WorkflowProgressService {
    db: DBService,
}

impl WorkflowProgressService {
    pub fn new(db: DBService) -> Self {
        Self { db }
    }

    pub async fn lookup_tracker(&self, project_id: Uuid) -> Result<TrackerLookup, sqlx::Error> {
        let rows = ProjectWorkflowTracker::find_by_project_id(&self.db.pool, project_id).await?;
        Ok(TrackerLookup::from_rows(rows))
    }

    pub async fn project_status(
        &self,
        project_id: Uuid,
    ) -> Result<ProjectWorkflowStatus, WorkflowProgressError> {
        if Project::find_by_id(&self.db.pool, project_id).await?.is_none() {
            return Err(WorkflowProgressError::ProjectNotFound(project_id));
        }
        let definition = WorkflowDefinition::load(&self.db.pool).await?;
        self.status_with_definition(&definition, project_id).await
    }

    /// Status of one project against an already loaded definition
    pub async fn status_with_definition(
        &self,
        definition: &WorkflowDefinition,
        project_id: Uuid,
    ) -> Result<ProjectWorkflowStatus, WorkflowProgressError> {
        let Some(tracker) = self.lookup_tracker(project_id).await?.into_primary(project_id) else {
            return Ok(ProjectWorkflowStatus::NoTracker);
        };
        let completed = CompletedWorkflowItem::find_by_tracker_id(&self.db.pool, tracker.id).await?;
        Ok(ProjectWorkflowStatus::Tracked(WorkflowProgress::compute(
            definition, &tracker, &completed,
        )))
    }

    /// Create the project's tracker, or resync the line item total of an existing one
    pub async fn initialize_project(
        &self,
        project_id: Uuid,
    ) -> Result<InitializedWorkflow, WorkflowProgressError> {
        let pool = &self.db.pool;
        let project = Project::find_by_id(pool, project_id)
            .await?
            .ok_or(WorkflowProgressError::ProjectNotFound(project_id))?;

        let definition = WorkflowDefinition::load(pool).await?;
        if definition.is_empty() {
            return Err(WorkflowProgressError::EmptyWorkflow);
        }
        let total = definition.total_line_items();

        if let Some(tracker) = self.lookup_tracker(project_id).await?.into_primary(project_id) {
            return Ok(InitializedWorkflow {
                tracker: self.resync_total(tracker, total).await?,
                created: false,
            });
        }

        let first = definition.first_pending(&HashSet::new());
        let data = CreateTracker {
            project_id,
            current_phase_id: first
                .map(|r| r.phase.id)
                .or_else(|| definition.phases.first().map(|p| p.phase.id)),
            current_step_id: first.map(|r| r.step.id),
            current_line_item_id: first.map(|r| r.line_item.id),
            total_line_items: total,
        };

        let tracker = match ProjectWorkflowTracker::create(pool, &data, Uuid::new_v4()).await {
            Ok(tracker) => tracker,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                // Another request initialized the project first
                debug!(project_id = %project_id, "Tracker created concurrently");
                let tracker = self
                    .lookup_tracker(project_id)
                    .await?
                    .into_primary(project_id)
                    .ok_or(WorkflowProgressError::TrackerNotFound(project_id))?;
                return Ok(InitializedWorkflow {
                    tracker: self.resync_total(tracker, total).await?,
                    created: false,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if project.status == ProjectStatus::Pending {
            Project::update_status(pool, project_id, ProjectStatus::Active).await?;
        }

        info!(
            project_id = %project_id,
            project_number = project.project_number,
            tracker_id = %tracker.id,
            total_line_items = total,
            "Initialized project workflow"
        );
        Ok(InitializedWorkflow {
            tracker,
            created: true,
        })
    }

    async fn resync_total(
        &self,
        mut tracker: ProjectWorkflowTracker,
        total: i64,
    ) -> Result<ProjectWorkflowTracker, sqlx::Error> {
        if tracker.total_line_items != total {
            info!(
                tracker_id = %tracker.id,
                from = tracker.total_line_items,
                to = total,
                "Resyncing tracker line item total"
            );
            ProjectWorkflowTracker::update_total_line_items(&self.db.pool, tracker.id, total)
                .await?;
            tracker.total_line_items = total;
        }
        Ok(tracker)
    }

    /// Mark a line item done and move the tracker to the next pending item.
    ///
    /// Completing an already completed item changes nothing. The current
    /// phase never moves backwards.
    pub async fn complete_line_item(
        &self,
        project_id: Uuid,
        line_item_id: Uuid,
        completed_by: Option<String>,
    ) -> Result<LineItemCompletion, WorkflowProgressError> {
        let pool = &self.db.pool;
        let project = Project::find_by_id(pool, project_id)
            .await?
            .ok_or(WorkflowProgressError::ProjectNotFound(project_id))?;
        let tracker = self
            .lookup_tracker(project_id)
            .await?
            .into_primary(project_id)
            .ok_or(WorkflowProgressError::TrackerNotFound(project_id))?;

        let definition = WorkflowDefinition::load(pool).await?;
        let item = definition
            .locate(line_item_id)
            .ok_or(WorkflowProgressError::UnknownLineItem(line_item_id))?;

        let newly_completed = CompletedWorkflowItem::create_if_absent(
            pool,
            &CreateCompletedWorkflowItem {
                tracker_id: tracker.id,
                phase_id: item.phase.id,
                step_id: item.step.id,
                line_item_id,
                completed_by,
            },
        )
        .await?
        .is_some();

        let completed_rows = CompletedWorkflowItem::find_by_tracker_id(pool, tracker.id).await?;
        let completed: HashSet<Uuid> = completed_rows.iter().map(|c| c.line_item_id).collect();
        let next = definition.first_pending(&completed);
        let finished = next.is_none();

        let position = next_position(&definition, &tracker, next);
        let previous_phase = tracker.current_phase_id;
        let tracker =
            ProjectWorkflowTracker::update_position(pool, tracker.id, &position, Utc::now())
                .await?;
        let phase_advanced = previous_phase != tracker.current_phase_id;

        let progress = WorkflowProgress::compute(&definition, &tracker, &completed_rows);

        if phase_advanced {
            let from_phase = previous_phase
                .and_then(|id| definition.phase(id))
                .map(|p| p.phase_name.clone());
            let to_phase = progress
                .current_phase
                .as_ref()
                .map(|p| p.phase_name.clone())
                .unwrap_or_default();
            info!(
                project_id = %project_id,
                from = ?from_phase,
                to = %to_phase,
                "Project advanced to a new workflow phase"
            );
            Notification::create(
                pool,
                &CreateNotification {
                    recipient_id: None,
                    title: "Workflow phase advanced".to_string(),
                    message: format!("{} moved to the {} phase", project.project_name, to_phase),
                    payload: NotificationPayload::PhaseAdvanced(PhaseAdvancedData {
                        project_id,
                        project_name: project.project_name.clone(),
                        from_phase,
                        to_phase,
                    }),
                },
            )
            .await?;
        }

        // The stored total can be stale, so the percent is display only
        if newly_completed && finished {
            info!(project_id = %project_id, "Project workflow completed");
            Notification::create(
                pool,
                &CreateNotification {
                    recipient_id: None,
                    title: "Workflow completed".to_string(),
                    message: format!("{} has completed every workflow item", project.project_name),
                    payload: NotificationPayload::WorkflowCompleted(WorkflowCompletedData {
                        project_id,
                        project_name: project.project_name.clone(),
                        total_line_items: definition.total_line_items(),
                    }),
                },
            )
            .await?;
            Project::update_status(pool, project_id, ProjectStatus::Completed).await?;
        }

        debug!(
            project_id = %project_id,
            line_item_id = %line_item_id,
            newly_completed,
            completion = %progress.completion,
            "Line item completion processed"
        );

        Ok(LineItemCompletion {
            newly_completed,
            phase_advanced,
            progress,
        })
    }
}

/// Where a tracker should point once `next` is the first pending line item.
/// The phase is the later of the current phase and the pending item's phase.
fn next_position(
    definition: &WorkflowDefinition,
    tracker: &ProjectWorkflowTracker,
    next: Option<LineItemRef<'_>>,
) -> TrackerPosition {
    let target_index = next
        .map(|r| r.phase_index)
        .unwrap_or_else(|| definition.phases.len().saturating_sub(1));
    let current_index = tracker
        .current_phase_id
        .and_then(|id| definition.phase_index(id));
    let phase_index = current_index.map_or(target_index, |current| current.max(target_index));

    TrackerPosition {
        phase_id: definition.phases.get(phase_index).map(|p| p.phase.id),
        step_id: next.map(|r| r.step.id),
        line_item_id: next.map(|r| r.line_item.id),
    }
}

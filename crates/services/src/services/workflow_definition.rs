//! The roofing workflow catalog: phases → steps → line items.
//!
//! The catalog ships as [`ROOFING_WORKFLOW`] and is seeded into the database
//! once, after which the stored copy is authoritative (line item names can be
//! edited in bulk). [`WorkflowDefinition`] is an ordered, in-memory snapshot
//! of the stored catalog.

use std::collections::HashSet;

use db::models::workflow::{
    LineItemNameUpdate, PhaseType, WorkflowLineItem, WorkflowPhase, WorkflowStep,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkflowDefinitionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no line item updates supplied")]
    EmptyUpdate,
    #[error("line item {0} has an empty name")]
    EmptyName(Uuid),
    #[error("line item {0} appears more than once")]
    DuplicateId(Uuid),
    #[error("line item {0} does not exist")]
    UnknownLineItem(Uuid),
}

pub struct PhaseTemplate {
    pub phase_type: PhaseType,
    pub name: &'static str,
    pub steps: &'static [StepTemplate],
}

pub struct StepTemplate {
    pub code: &'static str,
    pub name: &'static str,
    pub responsible_role: &'static str,
    pub alert_days: i64,
    pub line_items: &'static [&'static str],
}

pub const ROOFING_WORKFLOW: &[PhaseTemplate] = &[
    PhaseTemplate {
        phase_type: PhaseType::Lead,
        name: "Lead",
        steps: &[
            StepTemplate {
                code: "LEAD-1",
                name: "Input Customer Information",
                responsible_role: "office",
                alert_days: 1,
                line_items: &[
                    "Verify customer name and contact details",
                    "Send confirmation email",
                ],
            },
            StepTemplate {
                code: "LEAD-2",
                name: "Complete Questions Checklist",
                responsible_role: "office",
                alert_days: 1,
                line_items: &[
                    "Record insurance company and claim status",
                    "Record roof age and damage notes",
                ],
            },
            StepTemplate {
                code: "LEAD-3",
                name: "Input Lead Property Information",
                responsible_role: "office",
                alert_days: 2,
                line_items: &["Add home and roof details", "Upload property photos"],
            },
            StepTemplate {
                code: "LEAD-4",
                name: "Assign A Project Manager",
                responsible_role: "administration",
                alert_days: 1,
                line_items: &["Assign project manager", "Send introduction email to customer"],
            },
            StepTemplate {
                code: "LEAD-5",
                name: "Schedule Initial Inspection",
                responsible_role: "office",
                alert_days: 1,
                line_items: &[
                    "Schedule inspection with customer",
                    "Add inspection to crew calendar",
                ],
            },
        ],
    },
    PhaseTemplate {
        phase_type: PhaseType::Prospect,
        name: "Prospect",
        steps: &[
            StepTemplate {
                code: "PROSPECT-1",
                name: "Site Inspection",
                responsible_role: "project_manager",
                alert_days: 2,
                line_items: &[
                    "Take site photos",
                    "Complete inspection form",
                    "Record roof measurements",
                ],
            },
            StepTemplate {
                code: "PROSPECT-2",
                name: "Write Estimate",
                responsible_role: "project_manager",
                alert_days: 2,
                line_items: &[
                    "Fill out estimate forms",
                    "Send initial estimate to customer",
                ],
            },
            StepTemplate {
                code: "PROSPECT-3",
                name: "Insurance Process",
                responsible_role: "administration",
                alert_days: 3,
                line_items: &[
                    "Compare field and insurance estimates",
                    "Build trade cost sheet",
                ],
            },
            StepTemplate {
                code: "PROSPECT-4",
                name: "Agreement Preparation",
                responsible_role: "administration",
                alert_days: 2,
                line_items: &["Prepare agreement packet", "Send agreement for signature"],
            },
            StepTemplate {
                code: "PROSPECT-5",
                name: "Agreement Signing",
                responsible_role: "administration",
                alert_days: 2,
                line_items: &[
                    "Review agreement with customer",
                    "Collect signed agreement and deposit",
                ],
            },
        ],
    },
    PhaseTemplate {
        phase_type: PhaseType::Approved,
        name: "Approved",
        steps: &[
            StepTemplate {
                code: "APPROVED-1",
                name: "Administrative Setup",
                responsible_role: "administration",
                alert_days: 2,
                line_items: &["Confirm shingle selection", "Order materials", "Create labor orders"],
            },
            StepTemplate {
                code: "APPROVED-2",
                name: "Pre-Job Actions",
                responsible_role: "office",
                alert_days: 3,
                line_items: &["Pull permits"],
            },
            StepTemplate {
                code: "APPROVED-3",
                name: "Prepare For Production",
                responsible_role: "administration",
                alert_days: 1,
                line_items: &["Verify material delivery", "Confirm crew schedule"],
            },
        ],
    },
    PhaseTemplate {
        phase_type: PhaseType::Execution,
        name: "Execution",
        steps: &[
            StepTemplate {
                code: "EXECUTION-1",
                name: "Installation",
                responsible_role: "field_director",
                alert_days: 1,
                line_items: &["Document work start", "Capture progress photos"],
            },
            StepTemplate {
                code: "EXECUTION-2",
                name: "Quality Check",
                responsible_role: "field_director",
                alert_days: 1,
                line_items: &["Complete roof inspection", "Upload final photos"],
            },
            StepTemplate {
                code: "EXECUTION-3",
                name: "Multiple Trades",
                responsible_role: "administration",
                alert_days: 2,
                line_items: &[
                    "Confirm start of each additional trade",
                    "Confirm completion of each trade",
                ],
            },
            StepTemplate {
                code: "EXECUTION-4",
                name: "Subcontractor Work",
                responsible_role: "administration",
                alert_days: 2,
                line_items: &[
                    "Confirm subcontractor start",
                    "Confirm subcontractor completion",
                ],
            },
            StepTemplate {
                code: "EXECUTION-5",
                name: "Update Customer",
                responsible_role: "administration",
                alert_days: 1,
                line_items: &["Send progress update to customer"],
            },
        ],
    },
    PhaseTemplate {
        phase_type: PhaseType::SecondSupplement,
        name: "2nd Supplement",
        steps: &[
            StepTemplate {
                code: "SUPP-1",
                name: "Create Supplement",
                responsible_role: "administration",
                alert_days: 2,
                line_items: &[
                    "Check roof package and photos",
                    "Submit supplement to insurance",
                ],
            },
            StepTemplate {
                code: "SUPP-2",
                name: "Follow-Up Calls",
                responsible_role: "administration",
                alert_days: 3,
                line_items: &["Call insurance carrier twice weekly"],
            },
            StepTemplate {
                code: "SUPP-3",
                name: "Review Approved Supplement",
                responsible_role: "administration",
                alert_days: 2,
                line_items: &["Update trade cost sheet", "Prepare invoice"],
            },
            StepTemplate {
                code: "SUPP-4",
                name: "Customer Update",
                responsible_role: "administration",
                alert_days: 1,
                line_items: &["Share supplement results with customer"],
            },
        ],
    },
    PhaseTemplate {
        phase_type: PhaseType::Completion,
        name: "Completion",
        steps: &[
            StepTemplate {
                code: "COMPLETION-1",
                name: "Financial Processing",
                responsible_role: "administration",
                alert_days: 2,
                line_items: &["Verify worksheet", "Send final invoice", "Apply final payments"],
            },
            StepTemplate {
                code: "COMPLETION-2",
                name: "Project Closeout",
                responsible_role: "office",
                alert_days: 2,
                line_items: &["Register warranty", "Send closeout documents"],
            },
        ],
    },
];

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    #[serde(flatten)]
    #[ts(flatten)]
    pub step: WorkflowStep,
    pub line_items: Vec<WorkflowLineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDefinition {
    #[serde(flatten)]
    #[ts(flatten)]
    pub phase: WorkflowPhase,
    pub steps: Vec<StepDefinition>,
}

/// Ordered snapshot of the stored workflow catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub phases: Vec<PhaseDefinition>,
}

/// A line item together with the step and phase it sits in
#[derive(Debug, Clone, Copy)]
pub struct LineItemRef<'a> {
    pub phase_index: usize,
    pub phase: &'a WorkflowPhase,
    pub step: &'a WorkflowStep,
    pub line_item: &'a WorkflowLineItem,
}

impl WorkflowDefinition {
    pub async fn load(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let phases = WorkflowPhase::find_all(pool).await?;
        let steps = WorkflowStep::find_all(pool).await?;
        let line_items = WorkflowLineItem::find_all(pool).await?;
        Ok(Self::assemble(phases, steps, line_items))
    }

    /// Group already-ordered rows into the phase → step → line item tree
    pub fn assemble(
        phases: Vec<WorkflowPhase>,
        steps: Vec<WorkflowStep>,
        line_items: Vec<WorkflowLineItem>,
    ) -> Self {
        let mut phases: Vec<PhaseDefinition> = phases
            .into_iter()
            .map(|phase| PhaseDefinition {
                phase,
                steps: Vec::new(),
            })
            .collect();

        for step in steps {
            if let Some(phase) = phases.iter_mut().find(|p| p.phase.id == step.phase_id) {
                phase.steps.push(StepDefinition {
                    step,
                    line_items: Vec::new(),
                });
            }
        }

        for line_item in line_items {
            let step = phases
                .iter_mut()
                .flat_map(|p| p.steps.iter_mut())
                .find(|s| s.step.id == line_item.step_id);
            if let Some(step) = step {
                step.line_items.push(line_item);
            }
        }

        Self { phases }
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn total_line_items(&self) -> i64 {
        self.line_items().count() as i64
    }

    /// Every line item in execution order
    pub fn line_items(&self) -> impl Iterator<Item = LineItemRef<'_>> {
        self.phases
            .iter()
            .enumerate()
            .flat_map(|(phase_index, phase)| {
                phase.steps.iter().flat_map(move |step| {
                    step.line_items.iter().map(move |line_item| LineItemRef {
                        phase_index,
                        phase: &phase.phase,
                        step: &step.step,
                        line_item,
                    })
                })
            })
    }

    pub fn locate(&self, line_item_id: Uuid) -> Option<LineItemRef<'_>> {
        self.line_items().find(|r| r.line_item.id == line_item_id)
    }

    /// First line item (in execution order) not contained in `completed`
    pub fn first_pending(&self, completed: &HashSet<Uuid>) -> Option<LineItemRef<'_>> {
        self.line_items()
            .find(|r| !completed.contains(&r.line_item.id))
    }

    pub fn phase_index(&self, phase_id: Uuid) -> Option<usize> {
        self.phases.iter().position(|p| p.phase.id == phase_id)
    }

    pub fn phase(&self, phase_id: Uuid) -> Option<&WorkflowPhase> {
        self.phases
            .iter()
            .map(|p| &p.phase)
            .find(|p| p.id == phase_id)
    }

    pub fn last_phase(&self) -> Option<&WorkflowPhase> {
        self.phases.last().map(|p| &p.phase)
    }
}

/// Insert [`ROOFING_WORKFLOW`] when the catalog is empty. Returns whether anything was seeded.
pub async fn seed_default_catalog(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    if WorkflowPhase::count(pool).await? > 0 {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;
    let mut line_item_count = 0;

    for (phase_order, template) in ROOFING_WORKFLOW.iter().enumerate() {
        let phase = WorkflowPhase::create(
            &mut *tx,
            Uuid::new_v4(),
            template.phase_type,
            template.name,
            phase_order as i64,
        )
        .await?;

        for (step_order, step_template) in template.steps.iter().enumerate() {
            let step = WorkflowStep::create(
                &mut *tx,
                Uuid::new_v4(),
                phase.id,
                step_template.code,
                step_template.name,
                step_order as i64,
            )
            .await?;

            for (item_order, item_name) in step_template.line_items.iter().enumerate() {
                WorkflowLineItem::create(
                    &mut *tx,
                    Uuid::new_v4(),
                    step.id,
                    item_name,
                    Some(step_template.responsible_role),
                    step_template.alert_days,
                    item_order as i64,
                )
                .await?;
                line_item_count += 1;
            }
        }
    }

    tx.commit().await?;
    info!(
        phases = ROOFING_WORKFLOW.len(),
        line_items = line_item_count,
        "Seeded default roofing workflow catalog"
    );
    Ok(true)
}

/// Rename line items in one transaction. Either every update applies or none does.
pub async fn bulk_rename_line_items(
    pool: &SqlitePool,
    updates: &[LineItemNameUpdate],
) -> Result<usize, WorkflowDefinitionError> {
    if updates.is_empty() {
        return Err(WorkflowDefinitionError::EmptyUpdate);
    }

    let mut seen = HashSet::new();
    for update in updates {
        if update.item_name.trim().is_empty() {
            return Err(WorkflowDefinitionError::EmptyName(update.id));
        }
        if !seen.insert(update.id) {
            return Err(WorkflowDefinitionError::DuplicateId(update.id));
        }
    }

    let mut tx = pool.begin().await?;
    for update in updates {
        let touched =
            WorkflowLineItem::update_item_name(&mut *tx, update.id, update.item_name.trim())
                .await?;
        if touched == 0 {
            // Dropping the transaction rolls back the renames applied so far
            return Err(WorkflowDefinitionError::UnknownLineItem(update.id));
        }
    }
    tx.commit().await?;

    info!(count = updates.len(), "Renamed workflow line items");
    Ok(updates.len())
}

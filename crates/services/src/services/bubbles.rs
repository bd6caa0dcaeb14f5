//! Bubbles, the project assistant behind `POST /api/bubbles/chat`.
//!
//! Replies are grounded in the project's workflow state. With an Anthropic
//! key configured the reply comes from Claude; otherwise (or when Claude
//! fails) a plain status summary is returned.

use std::sync::Arc;

use async_trait::async_trait;
use db::{
    DBService,
    models::{
        notification::{Notification, NotificationType},
        project::Project,
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    claude_api::{ClaudeApiClient, ClaudeApiError, Message},
    workflow_progress::{
        CompletionSummary, ProjectWorkflowStatus, WorkflowProgressError, WorkflowProgressService,
    },
};

const SYSTEM_PROMPT: &str = "You are Bubbles, the assistant of a roofing contractor's project \
tracker. Answer briefly and only from the project context you are given. If the context does \
not answer the question, say so.";

#[derive(Debug, Error)]
pub enum BubblesError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error(transparent)]
    Progress(#[from] WorkflowProgressError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Claude,
    Summary,
}

/// What Bubbles knows about the project the user asked about
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub project_id: Uuid,
    pub project_number: i64,
    pub project_name: String,
    pub completion: Option<CompletionSummary>,
    pub current_phase: Option<String>,
    pub active_line_item: Option<String>,
    pub open_alerts: usize,
}

impl ProjectContext {
    fn summary(&self) -> String {
        let mut summary = format!("Project #{} {}", self.project_number, self.project_name);
        match &self.completion {
            None => summary.push_str(" has not been started in the workflow yet (NO TRACKER)."),
            Some(completion) => {
                summary.push_str(&format!(" is {completion} complete"));
                if let Some(phase) = &self.current_phase {
                    summary.push_str(&format!(" in the {phase} phase"));
                }
                summary.push('.');
                match &self.active_line_item {
                    Some(item) => summary.push_str(&format!(" Next up: {item}.")),
                    None => summary.push_str(" Every workflow item is done."),
                }
            }
        }
        if self.open_alerts > 0 {
            summary.push_str(&format!(" {} open alert(s).", self.open_alerts));
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub source: ReplySource,
    pub project: Option<ProjectContext>,
}

/// Anything that can turn a system prompt and conversation into a reply
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn reply(&self, system: &str, messages: &[Message]) -> Result<String, ClaudeApiError>;
}

#[async_trait]
impl AssistantBackend for ClaudeApiClient {
    async fn reply(&self, system: &str, messages: &[Message]) -> Result<String, ClaudeApiError> {
        ClaudeApiClient::reply(self, system, messages).await
    }
}

#[derive(Clone)]
pub struct BubblesService {
    db: DBService,
    backend: Option<Arc<dyn AssistantBackend>>,
}

impl BubblesService {
    pub fn new(db: DBService, backend: Option<Arc<dyn AssistantBackend>>) -> Self {
        Self { db, backend }
    }

    /// Build the service from an optional Anthropic key
    pub fn from_api_key(db: DBService, api_key: Option<&str>) -> Result<Self, ClaudeApiError> {
        let backend = match api_key {
            Some(key) => Some(Arc::new(ClaudeApiClient::new(key)?) as Arc<dyn AssistantBackend>),
            None => None,
        };
        Ok(Self::new(db, backend))
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BubblesError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(BubblesError::EmptyMessage);
        }

        let project = match request.project_id {
            Some(project_id) => Some(self.project_context(project_id).await?),
            None => None,
        };

        if let Some(backend) = &self.backend {
            let system = match &project {
                Some(context) => format!("{SYSTEM_PROMPT}\n\nProject context: {}", context.summary()),
                None => format!("{SYSTEM_PROMPT}\n\nNo project was selected."),
            };
            match backend.reply(&system, &[Message::user(message)]).await {
                Ok(reply) => {
                    return Ok(ChatResponse {
                        reply,
                        source: ReplySource::Claude,
                        project,
                    });
                }
                Err(e) => warn!(error = %e, "Bubbles: Claude reply failed, answering with a summary"),
            }
        }

        let reply = match &project {
            Some(context) => context.summary(),
            None => "Hi, I'm Bubbles. Pick a project and I'll tell you where its workflow stands."
                .to_string(),
        };
        debug!(project_id = ?request.project_id, "Bubbles: answered with summary");
        Ok(ChatResponse {
            reply,
            source: ReplySource::Summary,
            project,
        })
    }

    async fn project_context(&self, project_id: Uuid) -> Result<ProjectContext, BubblesError> {
        let project = Project::find_by_id(&self.db.pool, project_id)
            .await?
            .ok_or(BubblesError::ProjectNotFound(project_id))?;

        let status = WorkflowProgressService::new(self.db.clone())
            .project_status(project_id)
            .await?;

        let open_alerts = Notification::find_unread_by_project_id(&self.db.pool, project_id)
            .await
            .map_err(WorkflowProgressError::from)?
            .iter()
            .filter(|n| n.payload.notification_type() == NotificationType::WorkflowAlert)
            .count();

        let (completion, current_phase, active_line_item) = match &status {
            ProjectWorkflowStatus::NoTracker => (None, None, None),
            ProjectWorkflowStatus::Tracked(progress) => (
                Some(progress.completion),
                progress.current_phase.as_ref().map(|p| p.phase_name.clone()),
                progress.active_line_item.as_ref().map(|item| {
                    format!(
                        "{} ({} {})",
                        item.line_item.item_name, item.step_code, item.step_name
                    )
                }),
            ),
        };

        Ok(ProjectContext {
            project_id,
            project_number: project.project_number,
            project_name: project.project_name,
            completion,
            current_phase,
            active_line_item,
            open_alerts,
        })
    }
}

pub mod bubbles;
pub mod claude_api;
pub mod database_validator;
pub mod workflow_alerts;
pub mod workflow_definition;
pub mod workflow_progress;

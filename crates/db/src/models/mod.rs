pub mod completed_workflow_item;
pub mod notification;
pub mod project;
pub mod project_workflow_tracker;
pub mod workflow;

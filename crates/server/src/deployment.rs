use std::sync::Arc;

use db::DBService;
use services::services::{bubbles::BubblesService, claude_api::ClaudeApiError};
use utils::config::Config;

/// Shared handles every route works against
#[derive(Clone)]
pub struct Deployment {
    db: DBService,
    config: Arc<Config>,
    bubbles: BubblesService,
}

impl Deployment {
    pub fn new(db: DBService, config: Config) -> Result<Self, ClaudeApiError> {
        let bubbles = BubblesService::from_api_key(db.clone(), config.anthropic_api_key.as_deref())?;
        Ok(Self::with_bubbles(db, config, bubbles))
    }

    pub fn with_bubbles(db: DBService, config: Config, bubbles: BubblesService) -> Self {
        Self {
            db,
            config: Arc::new(config),
            bubbles,
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bubbles(&self) -> &BubblesService {
        &self.bubbles
    }
}

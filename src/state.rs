//! Process Context
//!
//! All long-lived state lives here, constructed once in `main` and passed
//! explicitly. No ambient singletons.

use std::sync::Arc;

use crate::models::settings::BotConfig;
use crate::services::metadata::MetadataRepository;
use crate::services::platform::ChatPlatform;
use crate::services::store::SheetStore;

pub struct BotContext {
    pub config: BotConfig,
    pub store: Arc<dyn SheetStore>,
    pub platform: Arc<dyn ChatPlatform>,
    pub repo: Arc<MetadataRepository>,
}

impl BotContext {
    pub fn new(
        config: BotConfig,
        store: Arc<dyn SheetStore>,
        platform: Arc<dyn ChatPlatform>,
    ) -> Self {
        let repo = Arc::new(MetadataRepository::new(Arc::clone(&store)));
        Self {
            config,
            store,
            platform,
            repo,
        }
    }
}

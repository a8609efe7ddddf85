use async_trait::async_trait;
use chrono::Utc;
use poise::serenity_prelude::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::store::PresenceStore;
use crate::tasks::Task;

/// Drops stale presence records even when no voice events arrive.
#[derive(Debug)]
pub struct PresencePruneTask {
    presence: Arc<PresenceStore>,
}

impl PresencePruneTask {
    pub fn new(presence: Arc<PresenceStore>) -> Self {
        Self { presence }
    }
}

#[async_trait]
impl Task for PresencePruneTask {
    fn name(&self) -> &str {
        "PresencePrune"
    }

    fn schedule(&self) -> Option<Duration> {
        Some(Duration::from_secs(600))
    }

    async fn execute(
        &mut self,
        _ctx: &Context,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let removed = self.presence.prune(Utc::now()).await;
        if removed > 0 {
            info!("Removed {} presence records older than {}h", removed, self.presence.retention().num_hours());
        }
        Ok(())
    }
}

use async_trait::async_trait;
use poise::serenity_prelude::{Context, FullEvent, VoiceState};
use std::sync::Arc;

use super::supervisor::{ChannelStateChange, ConfinementSupervisor};
use crate::events::EventHandler;

/// Feeds gateway voice state updates into the supervisor.
#[derive(Debug, Clone)]
pub struct VoiceStateHandler {
    supervisor: Arc<ConfinementSupervisor>,
}

impl VoiceStateHandler {
    pub fn new(supervisor: Arc<ConfinementSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl EventHandler for VoiceStateHandler {
    fn name(&self) -> &str {
        "VoiceState"
    }

    async fn handle(
        &self,
        _ctx: &Context,
        event: &FullEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let FullEvent::VoiceStateUpdate { old, new } = event {
            if let Some(change) = channel_change(old.as_ref(), new) {
                self.supervisor.handle_channel_change(change).await;
            }
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn EventHandler> {
        Box::new(self.clone())
    }
}

/// Voice states outside a guild carry nothing to act on.
fn channel_change(old: Option<&VoiceState>, new: &VoiceState) -> Option<ChannelStateChange> {
    let guild_id = new.guild_id?;

    let display_name = new
        .member
        .as_ref()
        .map(|m| m.user.name.clone())
        .unwrap_or_else(|| new.user_id.to_string());

    Some(ChannelStateChange {
        guild_id: guild_id.get(),
        user_id: new.user_id.get(),
        display_name,
        previous_channel: old.and_then(|s| s.channel_id).map(|c| c.get()),
        new_channel: new.channel_id.map(|c| c.get()),
    })
}

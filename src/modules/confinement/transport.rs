use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, ChannelType, Context, GuildId, UserId};
use std::fmt::{self, Debug};

pub type TransportResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Voice channel operations the confinement logic relies on.
///
/// Ids are raw snowflakes so the supervisor stays independent of the gateway.
#[async_trait]
pub trait ChannelTransport: Send + Sync + Debug {
    /// Voice channel the user currently occupies in the guild, if any.
    async fn current_channel(&self, guild_id: u64, user_id: u64) -> TransportResult<Option<u64>>;
    async fn resolve_channel(&self, guild_id: u64, name: &str) -> TransportResult<Option<u64>>;
    async fn move_member(&self, guild_id: u64, user_id: u64, channel_id: u64) -> TransportResult<()>;
    async fn send_message(&self, channel_id: u64, content: &str) -> TransportResult<()>;
}

#[derive(Clone)]
pub struct SerenityTransport {
    ctx: Context,
}

impl SerenityTransport {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }
}

impl Debug for SerenityTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerenityTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelTransport for SerenityTransport {
    async fn current_channel(&self, guild_id: u64, user_id: u64) -> TransportResult<Option<u64>> {
        let guild = self
            .ctx
            .cache
            .guild(GuildId::new(guild_id))
            .ok_or("Guild not in cache")?;

        Ok(guild
            .voice_states
            .get(&UserId::new(user_id))
            .and_then(|state| state.channel_id)
            .map(|id| id.get()))
    }

    async fn resolve_channel(&self, guild_id: u64, name: &str) -> TransportResult<Option<u64>> {
        let guild = self
            .ctx
            .cache
            .guild(GuildId::new(guild_id))
            .ok_or("Guild not in cache")?;

        Ok(guild
            .channels
            .values()
            .find(|c| matches!(c.kind, ChannelType::Voice | ChannelType::Stage) && c.name == name)
            .map(|c| c.id.get()))
    }

    async fn move_member(&self, guild_id: u64, user_id: u64, channel_id: u64) -> TransportResult<()> {
        GuildId::new(guild_id)
            .move_member(&self.ctx, UserId::new(user_id), ChannelId::new(channel_id))
            .await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> TransportResult<()> {
        ChannelId::new(channel_id).say(&self.ctx.http, content).await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory guild: tracks where members sit and records every move.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        pub channels: Mutex<HashMap<String, u64>>,
        pub locations: Mutex<HashMap<u64, u64>>,
        pub moves: Mutex<Vec<(u64, u64)>>,
        pub messages: Mutex<Vec<(u64, String)>>,
        pub fail_moves: Mutex<bool>,
    }

    impl MockTransport {
        pub fn with_channel(self, name: &str, id: u64) -> Self {
            self.channels.lock().unwrap().insert(name.to_string(), id);
            self
        }

        pub fn place(&self, user_id: u64, channel_id: Option<u64>) {
            let mut locations = self.locations.lock().unwrap();
            match channel_id {
                Some(id) => locations.insert(user_id, id),
                None => locations.remove(&user_id),
            };
        }

        pub fn moves(&self) -> Vec<(u64, u64)> {
            self.moves.lock().unwrap().clone()
        }

        pub fn messages(&self) -> Vec<(u64, String)> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelTransport for MockTransport {
        async fn current_channel(&self, _guild_id: u64, user_id: u64) -> TransportResult<Option<u64>> {
            Ok(self.locations.lock().unwrap().get(&user_id).copied())
        }

        async fn resolve_channel(&self, _guild_id: u64, name: &str) -> TransportResult<Option<u64>> {
            Ok(self.channels.lock().unwrap().get(name).copied())
        }

        async fn move_member(&self, _guild_id: u64, user_id: u64, channel_id: u64) -> TransportResult<()> {
            if *self.fail_moves.lock().unwrap() {
                return Err("missing Move Members permission".into());
            }
            self.moves.lock().unwrap().push((user_id, channel_id));
            self.locations.lock().unwrap().insert(user_id, channel_id);
            Ok(())
        }

        async fn send_message(&self, channel_id: u64, content: &str) -> TransportResult<()> {
            self.messages
                .lock()
                .unwrap()
                .push((channel_id, content.to_string()));
            Ok(())
        }
    }
}

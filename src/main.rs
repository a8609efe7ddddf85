use config::Config;
use databases::Databases;
use health::HealthState;
use modules::{
    allowlist::allowlist,
    confinement::{
        confine, confined,
        handler::VoiceStateHandler,
        release,
        supervisor::ConfinementSupervisor,
        transport::{ChannelTransport, SerenityTransport},
    },
    presence::{check, last, store::PresenceStore, task::PresencePruneTask},
    system::events::ReadyHandler,
    utils::commands::ping,
};
use poise::serenity_prelude::{self as serenity, CreateAllowedMentions};
use std::sync::Arc;
use tasks::TaskManager;
use tracing::{error, info, trace};
use tracing_subscriber::EnvFilter;

mod config;
mod database;
mod databases;
mod events;
mod health;
mod modules;
mod tasks;
mod utils;

use crate::events::EventManager;

#[derive(Clone, Debug)]
pub struct Data {
    pub config: Arc<Config>,
    pub dbs: Arc<Databases>,
    pub presence: Arc<PresenceStore>,
    pub supervisor: Arc<ConfinementSupervisor>,
    pub event_manager: Arc<EventManager>,
    pub task_manager: Arc<TaskManager>,
}

impl Data {
    pub async fn init(
        ctx: &serenity::Context,
        config: Arc<Config>,
        task_manager: Arc<TaskManager>,
    ) -> Result<Self, Error> {
        let dbs = Arc::new(Databases::open(&config).await?);
        let presence = Arc::new(PresenceStore::new(chrono::Duration::hours(
            config.presence.retention_hours,
        )));

        let transport: Arc<dyn ChannelTransport> = Arc::new(SerenityTransport::new(ctx.clone()));
        let supervisor = ConfinementSupervisor::new(
            transport,
            presence.clone(),
            config.confinement.holding_channel.clone(),
        );

        let event_manager = Arc::new(EventManager::new());
        event_manager.add_handler(ReadyHandler).await;
        event_manager
            .add_handler(VoiceStateHandler::new(supervisor.clone()))
            .await;

        let data = Self {
            config,
            dbs,
            presence,
            supervisor,
            event_manager,
            task_manager,
        };

        data.task_manager
            .add_task(PresencePruneTask::new(data.presence.clone()))
            .await;
        data.task_manager.start_tasks(ctx.clone()).await;

        tokio::spawn(health::serve(
            data.config.port,
            HealthState {
                presence: data.presence.clone(),
                supervisor: data.supervisor.clone(),
            },
        ));

        Ok(data)
    }
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("starting warden");

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let task_manager = Arc::new(TaskManager::new());
    let setup_config = config.clone();
    let setup_tasks = task_manager.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions::<Data, Error> {
            allowed_mentions: Some(CreateAllowedMentions::new().empty_roles().empty_users()),
            commands: vec![
                register(),
                ping(),
                check(),
                last(),
                confine(),
                release(),
                confined(),
                allowlist(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.prefix.clone()),
                ..Default::default()
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    trace!(
                        "Command {} used by {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command {} completed for {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!(
                                "Command {} failed for {} in {}: {:?}",
                                ctx.command().qualified_name,
                                ctx.author().tag(),
                                ctx.guild_id()
                                    .map_or_else(|| "DM".to_string(), |id| id.to_string()),
                                error
                            );
                        }
                        err => error!("Other framework error: {:?}", err),
                    }
                })
            },
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    data.event_manager.handle_event(ctx, event).await;
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                Data::init(ctx, setup_config, setup_tasks).await
            })
        })
        .build();

    let client = serenity::ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .await;

    let mut client = match client {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build client: {}", e);
            return;
        }
    };

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    task_manager.shutdown().await;
}

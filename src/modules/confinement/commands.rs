//! Confine and release commands.

use std::time::Duration;

use super::error::ConfinementError;
use super::supervisor::{ConfineRequest, ConfinementRecord};
use crate::modules::allowlist::commands::authorize;
use crate::{Context, Error};
use poise::command;
use poise::serenity_prelude::{self as serenity, Mentionable};

/// Hold a member in the holding channel for a while
#[command(slash_command, prefix_command, guild_only)]
pub async fn confine(
    ctx: Context<'_>,
    #[description = "Member to confine"] target: serenity::User,
    #[description = "Seconds to hold them (default: 60)"]
    #[min = 1]
    seconds: Option<u64>,
) -> Result<(), Error> {
    let reply = match try_confine(ctx, &target, seconds).await {
        Ok((record, restarted)) => render_confined(&record, restarted),
        Err(e) => e.render(),
    };
    ctx.say(reply).await?;
    Ok(())
}

async fn try_confine(
    ctx: Context<'_>,
    target: &serenity::User,
    seconds: Option<u64>,
) -> Result<(ConfinementRecord, bool), ConfinementError> {
    authorize(ctx).await?;

    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| ConfinementError::InvalidArgument("this only works in a server".into()))?;
    let settings = &ctx.data().config.confinement;
    let duration = resolve_duration(seconds, settings.default_duration_secs, settings.max_duration_secs)?;

    let supervisor = &ctx.data().supervisor;
    let restarted = supervisor.get(target.id.get()).await.is_some();
    let record = supervisor
        .confine(ConfineRequest {
            guild_id: guild_id.get(),
            user_id: target.id.get(),
            duration,
            notify_channel: Some(ctx.channel_id().get()),
        })
        .await?;

    Ok((record, restarted))
}

/// Let a confined member out early
#[command(slash_command, prefix_command, guild_only)]
pub async fn release(
    ctx: Context<'_>,
    #[description = "Member to release"] target: serenity::User,
) -> Result<(), Error> {
    if let Err(e) = authorize(ctx).await {
        ctx.say(e.render()).await?;
        return Ok(());
    }

    let reply = match ctx.data().supervisor.release(target.id.get()).await {
        Ok(record) => match record.original_channel {
            Some(channel) => format!(
                "🔓 {} has been released and sent back to <#{}>.",
                target.id.mention(),
                channel
            ),
            None => format!("🔓 {} has been released.", target.id.mention()),
        },
        Err(e) => e.render(),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// List members currently confined
#[command(slash_command, prefix_command, guild_only)]
pub async fn confined(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().map(|id| id.get());
    let records: Vec<ConfinementRecord> = ctx
        .data()
        .supervisor
        .active()
        .await
        .into_iter()
        .filter(|r| Some(r.guild_id) == guild_id)
        .collect();

    ctx.say(render_active(&records)).await?;
    Ok(())
}

fn resolve_duration(
    seconds: Option<u64>,
    default_secs: u64,
    max_secs: u64,
) -> Result<Duration, ConfinementError> {
    let secs = seconds.unwrap_or(default_secs);
    if secs == 0 || secs > max_secs {
        return Err(ConfinementError::InvalidArgument(format!(
            "duration must be between 1 and {} seconds",
            max_secs
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn render_confined(record: &ConfinementRecord, restarted: bool) -> String {
    let verb = if restarted { "confined again" } else { "confined" };
    format!(
        "🔒 <@{}> has been {} to <#{}> for {} seconds. Release <t:{}:R>.",
        record.user_id,
        verb,
        record.confinement_channel,
        record.duration.as_secs(),
        record.ends_at().timestamp()
    )
}

fn render_active(records: &[ConfinementRecord]) -> String {
    if records.is_empty() {
        return "⚪ Nobody is confined right now.".to_string();
    }

    let mut response = String::from("🔒 **Currently confined:**\n");
    for record in records {
        response.push_str(&format!(
            "• <@{}> in <#{}>, release <t:{}:R>\n",
            record.user_id,
            record.confinement_channel,
            record.ends_at().timestamp()
        ));
    }
    response.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn duration_defaults_and_bounds() {
        assert_eq!(resolve_duration(None, 60, 600), Ok(Duration::from_secs(60)));
        assert_eq!(resolve_duration(Some(5), 60, 600), Ok(Duration::from_secs(5)));
        assert!(matches!(
            resolve_duration(Some(0), 60, 600),
            Err(ConfinementError::InvalidArgument(_))
        ));
        assert!(matches!(
            resolve_duration(Some(601), 60, 600),
            Err(ConfinementError::InvalidArgument(_))
        ));
    }

    fn sample() -> ConfinementRecord {
        ConfinementRecord {
            user_id: 7,
            guild_id: 1,
            confinement_channel: 900,
            original_channel: Some(10),
            duration: Duration::from_secs(60),
            start_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            notify_channel: None,
        }
    }

    #[test]
    fn confined_reply_shows_deadline() {
        assert_eq!(
            render_confined(&sample(), false),
            "🔒 <@7> has been confined to <#900> for 60 seconds. Release <t:1700000060:R>."
        );
        assert!(render_confined(&sample(), true).contains("confined again"));
    }

    #[test]
    fn active_list() {
        assert_eq!(render_active(&[]), "⚪ Nobody is confined right now.");
        assert_eq!(
            render_active(&[sample()]),
            "🔒 **Currently confined:**\n• <@7> in <#900>, release <t:1700000060:R>"
        );
    }
}

use crate::modules::confinement::error::ConfinementError;
use crate::{Context, Error};
use poise::command;
use poise::serenity_prelude::{self as serenity, Mentionable};
use tracing::warn;

/// Administrators pass outright, everyone else needs an allow-list entry.
pub async fn authorize(ctx: Context<'_>) -> Result<(), ConfinementError> {
    let member = ctx.author_member().await;
    let is_admin = member
        .as_deref()
        .and_then(|m| ctx.guild().map(|guild| guild.member_permissions(m).administrator()))
        .unwrap_or(false);

    if ctx
        .data()
        .dbs
        .allow_list
        .is_authorized(ctx.author().id.get(), is_admin)
        .await
    {
        Ok(())
    } else {
        Err(ConfinementError::Unauthorized)
    }
}

/// Let a member confine others
#[command(slash_command, prefix_command, guild_only)]
pub async fn allow(
    ctx: Context<'_>,
    #[description = "Member to allow"] target: serenity::User,
) -> Result<(), Error> {
    if let Err(e) = authorize(ctx).await {
        ctx.say(e.render()).await?;
        return Ok(());
    }

    let (added, error) = ctx.data().dbs.allow_list.add(target.id.get()).await;
    let mut reply = if added {
        format!("✅ {} can now confine members.", target.id.mention())
    } else {
        format!("⚪ {} is already on the allow-list.", target.id.mention())
    };
    if let Some(e) = error {
        warn!("Allow-list change for {} not saved: {}", target.id, e);
        reply.push_str("\n⚠️ The change could not be saved and will be lost on restart.");
    }

    ctx.say(reply).await?;
    Ok(())
}

/// Take away a member's permission to confine
#[command(slash_command, prefix_command, guild_only)]
pub async fn disallow(
    ctx: Context<'_>,
    #[description = "Member to remove"] target: serenity::User,
) -> Result<(), Error> {
    if let Err(e) = authorize(ctx).await {
        ctx.say(e.render()).await?;
        return Ok(());
    }

    let (removed, error) = ctx.data().dbs.allow_list.remove(target.id.get()).await;
    let mut reply = if removed {
        format!("🗑️ {} can no longer confine members.", target.id.mention())
    } else {
        format!("⚪ {} was not on the allow-list.", target.id.mention())
    };
    if let Some(e) = error {
        warn!("Allow-list change for {} not saved: {}", target.id, e);
        reply.push_str("\n⚠️ The change could not be saved and will be lost on restart.");
    }

    ctx.say(reply).await?;
    Ok(())
}

/// Show who may confine members
#[command(slash_command, prefix_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let members = ctx.data().dbs.allow_list.members().await;
    ctx.say(render_members(&members)).await?;
    Ok(())
}

fn render_members(members: &[u64]) -> String {
    if members.is_empty() {
        return "⚪ Only administrators can confine members.".to_string();
    }

    let mut response = String::from("🛂 **Allowed besides administrators:**\n");
    for id in members {
        response.push_str(&format!("• <@{}>\n", id));
    }
    response.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_mentions_administrators() {
        assert!(render_members(&[]).contains("Only administrators"));
    }

    #[test]
    fn members_are_mentioned_one_per_line() {
        let text = render_members(&[3, 4]);
        assert!(text.ends_with("• <@3>\n• <@4>"));
    }
}

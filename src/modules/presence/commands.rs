use chrono::{DateTime, FixedOffset, Offset, Utc};

use super::store::PresenceRecord;
use crate::utils::{split_message, MESSAGE_LIMIT};
use crate::{Context, Error};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Show voice connect and disconnect times from the last few hours
#[poise::command(slash_command, prefix_command)]
pub async fn check(ctx: Context<'_>) -> Result<(), Error> {
    let presence = &ctx.data().presence;
    presence.prune(Utc::now()).await;

    let records = presence.all().await;
    for chunk in split_message(&render_presence(&records, display_offset(ctx)), MESSAGE_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Show who left voice most recently
#[poise::command(slash_command, prefix_command)]
pub async fn last(ctx: Context<'_>) -> Result<(), Error> {
    let presence = &ctx.data().presence;
    presence.prune(Utc::now()).await;

    let record = presence.most_recently_disconnected().await;
    ctx.say(render_last(record.as_ref(), display_offset(ctx))).await?;
    Ok(())
}

fn display_offset(ctx: Context<'_>) -> FixedOffset {
    FixedOffset::east_opt(ctx.data().config.presence.utc_offset_hours * 3600)
        .unwrap_or_else(|| Utc.fix())
}

fn format_time(time: DateTime<Utc>, offset: FixedOffset) -> String {
    time.with_timezone(&offset).format(TIME_FORMAT).to_string()
}

pub fn render_presence(records: &[PresenceRecord], offset: FixedOffset) -> String {
    if records.is_empty() {
        return "No records.".to_string();
    }

    let mut response = String::new();
    for record in records {
        let disconnect = record
            .disconnect_time
            .map(|t| format_time(t, offset))
            .unwrap_or_else(|| "connected".to_string());
        let last_disconnect = record
            .last_disconnect_time
            .map(|t| format_time(t, offset))
            .unwrap_or_else(|| "no record".to_string());

        response.push_str(&format!(
            "Username: {}\nConnected: {}\nDisconnected: {}\nPrevious disconnect: {}\n\n",
            record.display_name,
            format_time(record.connect_time, offset),
            disconnect,
            last_disconnect
        ));
    }
    response.trim_end().to_string()
}

pub fn render_last(record: Option<&PresenceRecord>, offset: FixedOffset) -> String {
    match record.and_then(|r| r.disconnect_time.map(|t| (r, t))) {
        Some((record, at)) => format!(
            "Last to disconnect: **{}** at {}",
            record.display_name,
            format_time(at, offset)
        ),
        None => "No disconnected users.".to_string(),
    }
}

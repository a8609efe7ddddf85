pub mod commands;
pub mod database;

use commands::*;
use poise::command;

/// 🛂 Members allowed to confine others without administrator rights
#[command(
    slash_command,
    prefix_command,
    subcommands("allow", "disallow", "list"),
    guild_only,
    category = "Confinement"
)]
pub async fn allowlist(_ctx: crate::Context<'_>) -> Result<(), crate::Error> {
    Ok(())
}

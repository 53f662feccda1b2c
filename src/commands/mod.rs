mod ask;
mod config;
mod manage;

use poise::CreateReply;

use crate::state::Context;

/// WikiMe - Wikipedia-grounded Gemini assistant
#[poise::command(
    slash_command,
    subcommands(
        "ask::ask",
        "manage::clear",
        "manage::history",
        "config::key",
        "config::thinking"
    )
)]
pub async fn wiki(_ctx: Context<'_>) -> Result<(), anyhow::Error> {
    Ok(())
}

/// A reply only the invoking user sees.
fn notice(text: &str) -> CreateReply {
    CreateReply::default().content(text).ephemeral(true)
}

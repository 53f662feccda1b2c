use tracing::info;

use super::notice;
use crate::credential::mask;
use crate::state::Context;

/// Whether the invoking user may change shared settings.
pub async fn is_admin(ctx: &Context<'_>) -> bool {
    ctx.data().is_admin(ctx.author().id.get())
}

/// Set, show, or remove the Gemini API key (admin only)
#[poise::command(slash_command, guild_only)]
pub async fn key(
    ctx: Context<'_>,
    #[description = "New Gemini API key (omit to show status)"] value: Option<String>,
    #[description = "Remove the stored key"] remove: Option<bool>,
) -> Result<(), anyhow::Error> {
    if !is_admin(&ctx).await {
        ctx.send(notice("This command is admin-only.")).await?;
        return Ok(());
    }

    let store = &ctx.data().credential;
    let reply = match (value, remove.unwrap_or(false)) {
        (_, true) => {
            store.set("").await?;
            info!(user = ctx.author().name, "Gemini API key removed");
            "Gemini API key removed. Questions are disabled until a new key is set.".to_string()
        }
        (Some(value), false) if !value.trim().is_empty() => {
            store.set(&value).await?;
            info!(user = ctx.author().name, "Gemini API key updated");
            format!("Gemini API key saved (`{}`).", mask(value.trim()))
        }
        (Some(_), false) => "Please enter a valid API key.".to_string(),
        (None, false) => {
            let current = store.get().await;
            if current.is_empty() {
                "No Gemini API key configured. Use `/wiki key value:<key>` to add one.".to_string()
            } else {
                format!("Gemini API key configured (`{}`).", mask(&current))
            }
        }
    };

    ctx.send(notice(&reply)).await?;
    Ok(())
}

/// Show or hide the model's reasoning under answers
#[poise::command(slash_command, guild_only)]
pub async fn thinking(
    ctx: Context<'_>,
    #[description = "Show reasoning (omit to show the current setting)"] enabled: Option<bool>,
) -> Result<(), anyhow::Error> {
    let reply = match enabled {
        None => {
            let settings = ctx.data().settings.read().await;
            format!(
                "Reasoning is currently **{}**.",
                if settings.show_reasoning { "shown" } else { "hidden" }
            )
        }
        Some(enabled) => {
            let mut settings = ctx.data().settings.write().await;
            settings.show_reasoning = enabled;
            format!(
                "Reasoning will now be **{}**.",
                if enabled { "shown" } else { "hidden" }
            )
        }
    };

    ctx.say(reply).await?;
    Ok(())
}

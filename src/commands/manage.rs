use tracing::info;

use crate::commands::ask::send_chunked;
use crate::history::MessageStore;
use crate::render::render_history_line;
use crate::state::Context;

/// Clear this channel's chat history
#[poise::command(slash_command, guild_only)]
pub async fn clear(ctx: Context<'_>) -> Result<(), anyhow::Error> {
    let conversation = ctx.data().conversation(ctx.channel_id().get());
    conversation.clear().await?;
    let generation = conversation.generation().await;

    info!(
        user = ctx.author().name,
        conversation = conversation.key(),
        generation,
        "Chat cleared"
    );
    ctx.say("Chat cleared. All messages have been removed.").await?;
    Ok(())
}

/// Show this channel's recent chat history
#[poise::command(slash_command, guild_only)]
pub async fn history(
    ctx: Context<'_>,
    #[description = "Max messages to show"] limit: Option<u32>,
) -> Result<(), anyhow::Error> {
    let limit = limit.unwrap_or(20).max(1) as usize;
    let messages = ctx
        .data()
        .conversation(ctx.channel_id().get())
        .list()
        .await?;

    if messages.is_empty() {
        ctx.say("No messages yet. Use `/wiki ask` to start a conversation.")
            .await?;
        return Ok(());
    }

    let skip = messages.len().saturating_sub(limit);
    let mut output = format!(
        "**Chat history** ({} of {} messages)\n\n",
        messages.len() - skip,
        messages.len()
    );
    for message in &messages[skip..] {
        output.push_str(&render_history_line(message));
        output.push('\n');
    }

    send_chunked(&ctx, &output).await
}

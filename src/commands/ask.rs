use tracing::info;

use super::notice;
use crate::chat::Outcome;
use crate::error::ChatError;
use crate::render::render_message;
use crate::state::Context;

/// Ask a question (looked up on Wikipedia when longer than 3 characters)
#[poise::command(slash_command, guild_only)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Your question"] question: String,
) -> Result<(), anyhow::Error> {
    let question = question.trim().to_string();
    if question.is_empty() {
        ctx.send(notice("Ask me something first.")).await?;
        return Ok(());
    }

    let channel_id = ctx.channel_id().get();
    let Some(_guard) = ctx.data().in_flight.try_begin(&channel_id.to_string()) else {
        ctx.send(notice(
            "Still working on the previous question in this channel. Try again once it is answered.",
        ))
        .await?;
        return Ok(());
    };

    let credential = ctx.data().credential.get().await;
    if credential.trim().is_empty() {
        ctx.send(notice(&ChatError::CredentialRequired.to_string()))
            .await?;
        return Ok(());
    }

    ctx.defer().await?;

    info!(
        user = ctx.author().name,
        channel = channel_id,
        question_len = question.len(),
        "Question received"
    );

    let show_reasoning = ctx.data().settings.read().await.show_reasoning;
    let conversation = ctx.data().conversation(channel_id);
    let outcome = ctx
        .data()
        .responder
        .handle(&question, &credential, &conversation)
        .await;

    let reply = match outcome {
        Ok(Outcome::Answered(message)) => format!(
            "**Q:** {}\n\n{}",
            question,
            render_message(&message, show_reasoning)
        ),
        Ok(Outcome::Failed(message)) => format!(
            "Failed to process your request: {}\n\n{}",
            message.error().unwrap_or("unknown error"),
            render_message(&message, show_reasoning)
        ),
        Ok(Outcome::Discarded) => {
            "The chat was cleared before this answer arrived, so it was dropped.".to_string()
        }
        Err(ChatError::CredentialRequired) => ChatError::CredentialRequired.to_string(),
        Err(e) => return Err(e.into()),
    };

    send_chunked(&ctx, &reply).await
}

/// Send a message in Discord-safe chunks (max 1990 chars).
/// Uses ctx.say() for all chunks — poise routes follow-ups through the
/// interaction webhook, which doesn't require Send Messages channel permission.
pub(crate) async fn send_chunked(ctx: &Context<'_>, text: &str) -> Result<(), anyhow::Error> {
    for chunk in split_chunks(text, 1990) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Split on line or word boundaries, never inside a UTF-8 character.
fn split_chunks(text: &str, max_len: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining);
            break;
        }
        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let split_at = remaining[..limit]
            .rfind('\n')
            .or_else(|| remaining[..limit].rfind(' '))
            .map(|i| i + 1)
            .unwrap_or(limit);
        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    chunks
}

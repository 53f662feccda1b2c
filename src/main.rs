mod chat;
mod commands;
mod credential;
mod error;
mod history;
mod llm;
mod render;
mod state;
mod wiki;

use std::collections::HashSet;
use std::sync::Arc;

use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tokio::sync::RwLock;
use tracing::{error, info, warn, Level};

use chat::{InFlight, Responder, DEFAULT_MAX_SECTION_CHARS};
use credential::CredentialStore;
use history::ChatHistory;
use llm::GeminiClient;
use state::{AppState, ChatSettings};
use wiki::WikiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();

    let level = dotenv::var("LOG_LEVEL")
        .ok()
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let token = dotenv::var("DISCORD_TOKEN").map_err(|_| anyhow::anyhow!("DISCORD_TOKEN required"))?;
    let guild_id: Option<serenity::GuildId> = dotenv::var("DISCORD_GUILD_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(serenity::GuildId::new);

    // Init storage
    let data_dir = std::path::PathBuf::from(
        dotenv::var("DATA_DIR").unwrap_or_else(|_| "./data/chat".to_string()),
    );
    let storage = history::open_storage(&data_dir).await?;
    info!("Chat storage initialized at {:?}", data_dir);

    let history = ChatHistory::new(storage.clone());
    let env_key = dotenv::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
    let credential = Arc::new(CredentialStore::load(storage, env_key).await?);

    // Init clients
    let gemini = Arc::new(GeminiClient::from_env()?);
    info!(model = gemini.model(), "Gemini client initialized");
    let wiki = Arc::new(WikiClient::from_env()?);

    let max_section_chars = dotenv::var("WIKI_MAX_SECTION_CHARS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_SECTION_CHARS);
    let responder =
        Arc::new(Responder::new(wiki, gemini).with_max_section_chars(max_section_chars));

    // Parse admin user IDs from env
    let admin_ids: HashSet<u64> = dotenv::var("ADMIN_USER_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect();
    if admin_ids.is_empty() {
        warn!("ADMIN_USER_IDS is empty: any guild member can change the Gemini API key");
    } else {
        info!(count = admin_ids.len(), "Admin users configured");
    }

    let app_state = AppState {
        history,
        credential,
        responder,
        in_flight: InFlight::new(),
        admin_ids,
        settings: Arc::new(RwLock::new(ChatSettings::default())),
    };

    let intents = serenity::GatewayIntents::GUILDS;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::wiki()],
            on_error: |err| {
                Box::pin(async move {
                    if let poise::FrameworkError::Command { error, ctx, .. } = err {
                        error!(command = ctx.command().name, "Command failed: {:#}", error);
                        let _ = ctx.say(format!("Something went wrong: {}", error)).await;
                    } else if let Err(e) = poise::builtins::on_error(err).await {
                        error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting WikiMe Discord bot...");

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}

use poise::serenity_prelude as serenity;
use quotr::commands::{admin, quotes, settings};
use quotr::db::Database;
use quotr::platform::SerenityPlatform;
use quotr::render::QuoteRenderer;
use quotr::services::QuoteService;
use quotr::{config::Config, events, Data};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    // Fail fast, before connecting to Discord, when storage is unreachable.
    let db = Database::connect_with_retry(&config).await?;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                settings::set_quote_channel(),
                settings::scan(),
                settings::set_quote_regex(),
                settings::clear_quote_regex(),
                settings::clear_quotes(),
                quotes::quote(),
                quotes::guess(),
                admin::guild_info(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::handle_event(ctx, event, framework, data))
            },
            on_error: |err| {
                Box::pin(async move {
                    match err {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Command /{} failed: {}", ctx.command().name, error);
                            let _ = ctx
                                .send(
                                    poise::CreateReply::default()
                                        .content("❌ Something went wrong, please try again later.")
                                        .ephemeral(true),
                                )
                                .await;
                        }
                        other => {
                            if let Err(e) = poise::builtins::on_error(other).await {
                                error!("Error while handling error: {}", e);
                            }
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                if config.guild_ids.is_empty() {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                } else {
                    for guild_id in &config.guild_ids {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(*guild_id),
                        )
                        .await?;
                    }
                }

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let renderer = match QuoteRenderer::load(&config.font_bold_path, &config.font_regular_path) {
                    Ok(renderer) => Some(Arc::new(renderer)),
                    Err(e) => {
                        warn!("Quote cards disabled: {:#}", e);
                        None
                    }
                };
                let platform = Arc::new(SerenityPlatform::new(ctx.http.clone()));
                let quotes = QuoteService::new(&config, Arc::new(db), platform);

                Ok(Data {
                    config,
                    quotes,
                    renderer,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

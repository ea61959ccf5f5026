use crate::platform::ChatMessage;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info};

/// Gateway events that drive live quote capture and guild bookkeeping.
pub async fn handle_event(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            // Startup replays every guild; only act on real joins.
            if is_new.unwrap_or(false) {
                info!("Joined guild {} ({})", guild.name, guild.id);
                data.quotes.guild_joined(guild.id.get()).await?;
            }
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            // Outages also arrive as deletes, flagged unavailable.
            if !incomplete.unavailable {
                data.quotes.guild_left(incomplete.id.get()).await?;
            }
        }
        serenity::FullEvent::Message { new_message } => {
            if new_message.author.bot {
                return Ok(());
            }
            let Some(guild_id) = new_message.guild_id else {
                return Ok(());
            };
            let message = ChatMessage::from(new_message);
            if let Err(e) = data.quotes.handle_message(guild_id.get(), &message).await {
                error!("Failed to process message {}: {:#}", message.id, e);
            }
        }
        serenity::FullEvent::MessageUpdate { event, .. } => {
            if event.author.as_ref().is_some_and(|a| a.bot) {
                return Ok(());
            }
            let Some(guild_id) = event.guild_id else {
                return Ok(());
            };
            debug!("Message {} edited", event.id);
            if let Err(e) = data
                .quotes
                .handle_edit(guild_id.get(), event.channel_id.get(), event.id.get())
                .await
            {
                error!("Failed to process edit of message {}: {:#}", event.id, e);
            }
        }
        serenity::FullEvent::MessageDelete {
            deleted_message_id,
            guild_id: Some(_),
            ..
        } => {
            if let Err(e) = data.quotes.handle_delete(deleted_message_id.get()).await {
                error!(
                    "Failed to remove quote for deleted message {}: {:#}",
                    deleted_message_id, e
                );
            }
        }
        _ => {}
    }
    Ok(())
}

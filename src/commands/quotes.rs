use super::reply_quote_error;
use crate::config::{DISCORD_EMBED_LIMIT, DISCORD_FIELD_LIMIT};
use crate::discord_text::truncate_chars;
use crate::render::{parse_hex_color, QuoteRenderer, PALETTE};
use crate::{Context, Error};
use image::Rgb;
use poise::serenity_prelude as serenity;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use tracing::{debug, info};

/// The quote's source message, if it can still be fetched.
async fn source_message(
    ctx: Context<'_>,
    guild_id: u64,
    message_id: u64,
) -> Result<Option<serenity::Message>, Error> {
    let Some(channel_id) = ctx.data().quotes.quote_channel(guild_id).await? else {
        return Ok(None);
    };
    match serenity::ChannelId::new(channel_id)
        .message(ctx, serenity::MessageId::new(message_id))
        .await
    {
        Ok(message) => Ok(Some(message)),
        Err(e) => {
            debug!("Source message {} unavailable: {}", message_id, e);
            Ok(None)
        }
    }
}

async fn render_card(
    renderer: Arc<QuoteRenderer>,
    quote: String,
    author: Option<String>,
    color: Rgb<u8>,
) -> Result<Vec<u8>, Error> {
    let bytes = tokio::task::spawn_blocking(move || renderer.render(&quote, author.as_deref(), color))
        .await??;
    Ok(bytes)
}

/// Get a random quote from the database
#[poise::command(slash_command, guild_only)]
pub async fn quote(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let record = match ctx.data().quotes.random_quote(guild_id.get()).await {
        Ok(record) => record,
        Err(e) => return reply_quote_error(ctx, e).await,
    };

    let link = match source_message(ctx, guild_id.get(), record.message_id).await? {
        Some(message) => format!("[Jump to Message]({})", message.link()),
        None => "Message not found".to_string(),
    };
    let embed = serenity::CreateEmbed::new()
        .title("Random Quote")
        .description(truncate_chars(&record.content, DISCORD_EMBED_LIMIT))
        .field("Author", truncate_chars(&record.author, DISCORD_FIELD_LIMIT), false)
        .field("Message Link", link, false)
        .color(0x57F287);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Start a guessing game
#[poise::command(slash_command, guild_only)]
pub async fn guess(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer().await?;

    let record = match ctx.data().quotes.random_quote(guild_id.get()).await {
        Ok(record) => record,
        Err(e) => return reply_quote_error(ctx, e).await,
    };
    let color = {
        let mut rng = rand::rng();
        PALETTE.choose(&mut rng).copied().unwrap_or(PALETTE[0])
    };
    let color = parse_hex_color(color)?;
    let source = source_message(ctx, guild_id.get(), record.message_id).await?;
    let renderer = ctx.data().renderer.clone();

    let mut embed = serenity::CreateEmbed::new()
        .title("Guess the Quote")
        .description(truncate_chars(&record.content, DISCORD_EMBED_LIMIT))
        .field("Who said that??", ":eyes:", true)
        .color(0x57F287);
    if let Some(message) = &source {
        embed = embed.author(
            serenity::CreateEmbedAuthor::new(format!("Submitted by {}", message.author.name))
                .icon_url(message.author.face()),
        );
    }

    let reveal_id = format!("reveal_quote_{}", ctx.id());
    let delete_id = format!("not_a_quote_{}", ctx.id());
    let delete_button = serenity::CreateButton::new(delete_id.clone())
        .label("Not a quote!")
        .style(serenity::ButtonStyle::Danger);

    let mut reply = poise::CreateReply::default().components(vec![
        serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new(reveal_id.clone())
                .label("Reveal")
                .style(serenity::ButtonStyle::Primary),
            delete_button.clone(),
        ]),
    ]);
    if let Some(renderer) = &renderer {
        let card = render_card(renderer.clone(), record.content.clone(), None, color).await?;
        embed = embed.image("attachment://quote.png");
        reply = reply.attachment(serenity::CreateAttachment::bytes(card, "quote.png"));
    }
    let handle = ctx.send(reply.embed(embed)).await?;
    let message = handle.message().await?;

    loop {
        let Some(interaction) = message
            .await_component_interaction(ctx.serenity_context())
            .custom_ids(vec![reveal_id.clone(), delete_id.clone()])
            .timeout(ctx.data().config.interaction_timeout)
            .await
        else {
            handle
                .edit(ctx, poise::CreateReply::default().components(vec![]))
                .await?;
            return Ok(());
        };

        if interaction.data.custom_id == reveal_id {
            let mut revealed = serenity::CreateEmbed::new()
                .title("Guess the Quote")
                .description(truncate_chars(&record.content, DISCORD_EMBED_LIMIT))
                .field("Who said that??", truncate_chars(&record.author, DISCORD_FIELD_LIMIT), true)
                .footer(
                    serenity::CreateEmbedFooter::new(format!(
                        "Quote revealed by {}",
                        interaction.user.name
                    ))
                    .icon_url(interaction.user.face()),
                )
                .color(0x57F287);
            if let Some(source) = &source {
                revealed = revealed
                    .author(
                        serenity::CreateEmbedAuthor::new(format!(
                            "Submitted by {}",
                            source.author.name
                        ))
                        .icon_url(source.author.face()),
                    )
                    .field(
                        "Message Link",
                        format!("[Jump to Message]({})", source.link()),
                        true,
                    );
            }

            let mut response = serenity::CreateInteractionResponseMessage::new().components(vec![
                serenity::CreateActionRow::Buttons(vec![delete_button.clone()]),
            ]);
            if let Some(renderer) = &renderer {
                let card = render_card(
                    renderer.clone(),
                    record.content.clone(),
                    Some(record.author.clone()),
                    color,
                )
                .await?;
                revealed = revealed.image("attachment://quote-revealed.png");
                response =
                    response.add_file(serenity::CreateAttachment::bytes(card, "quote-revealed.png"));
            }
            interaction
                .create_response(
                    ctx.serenity_context(),
                    serenity::CreateInteractionResponse::UpdateMessage(response.embed(revealed)),
                )
                .await?;
            continue;
        }

        let allowed = interaction
            .member
            .as_ref()
            .and_then(|m| m.permissions)
            .is_some_and(|p| p.manage_messages());
        if !allowed {
            interaction
                .create_response(
                    ctx.serenity_context(),
                    serenity::CreateInteractionResponse::Message(
                        serenity::CreateInteractionResponseMessage::new()
                            .content("Only moderators can remove quotes.")
                            .ephemeral(true),
                    ),
                )
                .await?;
            continue;
        }

        let text = match ctx
            .data()
            .quotes
            .delete_quote(guild_id.get(), record.message_id)
            .await
        {
            Ok(_) => "🗑️ Quote deleted.".to_string(),
            Err(e) => match e.user_message() {
                Some(text) => text,
                None => return Err(e.into()),
            },
        };
        info!(
            "Quote {} flagged as not a quote by {}",
            record.message_id, interaction.user.name
        );
        interaction
            .create_response(
                ctx.serenity_context(),
                serenity::CreateInteractionResponse::Message(
                    serenity::CreateInteractionResponseMessage::new()
                        .content(text)
                        .ephemeral(true),
                ),
            )
            .await?;
        handle.delete(ctx).await?;
        return Ok(());
    }
}

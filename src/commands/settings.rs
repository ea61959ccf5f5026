use super::reply_quote_error;
use crate::discord_text::code_span;
use crate::error::QuoteError;
use crate::quotes::{BackfillReport, ScanOutcome};
use crate::services::ScanHandle;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use std::future::IntoFuture;
use tracing::info;

/// Set the channel quotes are collected from
#[poise::command(
    slash_command,
    rename = "setquotechannel",
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn set_quote_channel(
    ctx: Context<'_>,
    #[description = "Quote channel (defaults to this channel)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    ctx.defer_ephemeral().await?;

    let service = &ctx.data().quotes;
    if let Err(e) = service
        .set_quote_channel(guild_id.get(), channel_id.get())
        .await
    {
        return reply_quote_error(ctx, e).await;
    }
    info!(
        "Quote channel for guild {} set to {} by {}",
        guild_id,
        channel_id,
        ctx.author().name
    );

    let embed = serenity::CreateEmbed::new()
        .title("Quote Channel Set")
        .description(format!(
            "The quote channel has been set to <#{}>. I'll scan the last `{}` messages for quotes. Any new messages will also be scanned.",
            channel_id,
            service.default_scan_limit()
        ))
        .field("Channel", format!("<#{}>", channel_id), false)
        .color(0x57F287);

    match service.start_scan(guild_id.get(), None).await {
        Ok(scan) => follow_scan(ctx, embed, "Stop Processing", scan).await,
        Err(QuoteError::ScanAlreadyRunning) => {
            let embed = embed.field(
                "Scan",
                "A scan is still winding down, run `/scan` in a moment.",
                false,
            );
            ctx.send(poise::CreateReply::default().embed(embed)).await?;
            Ok(())
        }
        Err(e) => reply_quote_error(ctx, e).await,
    }
}

/// Scan the quote channel for quotes
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD", guild_only)]
pub async fn scan(
    ctx: Context<'_>,
    #[description = "How many messages to scan"]
    #[min = 1]
    #[max = 100000]
    limit: Option<usize>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer_ephemeral().await?;

    let service = &ctx.data().quotes;
    let scan = match service.start_scan(guild_id.get(), limit).await {
        Ok(scan) => scan,
        Err(e) => return reply_quote_error(ctx, e).await,
    };
    let channel = service.quote_channel(guild_id.get()).await?.unwrap_or_default();

    let embed = serenity::CreateEmbed::new()
        .title("Quote Channel Scanning")
        .description(format!(
            "Scanning the quote channel <#{}> for quotes. This may take a while.",
            channel
        ))
        .field("Channel", format!("<#{}>", channel), false)
        .color(0x57F287);
    follow_scan(ctx, embed, "Stop Scan", scan).await
}

/// Sends the scan embed with a stop button and keeps it updated until the scan
/// ends, is stopped or the button expires.
async fn follow_scan(
    ctx: Context<'_>,
    embed: serenity::CreateEmbed,
    stop_label: &str,
    scan: ScanHandle,
) -> Result<(), Error> {
    let ScanHandle { cancel, mut task } = scan;
    let stop_id = format!("stop_scan_{}", ctx.id());
    let reply = ctx
        .send(
            poise::CreateReply::default()
                .embed(embed.clone())
                .components(vec![serenity::CreateActionRow::Buttons(vec![
                    serenity::CreateButton::new(stop_id.clone())
                        .label(stop_label)
                        .style(serenity::ButtonStyle::Danger),
                ])]),
        )
        .await?;
    let message = reply.message().await?;

    let stop = message
        .await_component_interaction(ctx.serenity_context())
        .author_id(ctx.author().id)
        .custom_ids(vec![stop_id])
        .timeout(ctx.data().config.interaction_timeout)
        .into_future();

    tokio::select! {
        interaction = stop => {
            let Some(interaction) = interaction else {
                // Button expired; the scan keeps going.
                reply
                    .edit(ctx, poise::CreateReply::default().embed(embed).components(vec![]))
                    .await?;
                return Ok(());
            };
            cancel.cancel();
            interaction
                .create_response(
                    ctx.serenity_context(),
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .content("⏹️ Stopping...")
                            .components(vec![]),
                    ),
                )
                .await?;
            let report = (&mut task).await.ok().flatten();
            reply
                .edit(
                    ctx,
                    poise::CreateReply::default()
                        .content("")
                        .embed(with_report(embed, report.as_ref()))
                        .components(vec![]),
                )
                .await?;
        }
        report = &mut task => {
            let report = report.ok().flatten();
            reply
                .edit(
                    ctx,
                    poise::CreateReply::default()
                        .embed(with_report(embed, report.as_ref()))
                        .components(vec![]),
                )
                .await?;
        }
    }
    Ok(())
}

fn with_report(embed: serenity::CreateEmbed, report: Option<&BackfillReport>) -> serenity::CreateEmbed {
    let Some(report) = report else {
        return embed.field("Result", "❌ The scan failed, check the logs.", false);
    };
    let status = match report.outcome {
        ScanOutcome::Exhausted => "✅ Reached the start of the channel",
        ScanOutcome::LimitReached => "✅ Done",
        ScanOutcome::Cancelled => "⏹️ Stopped",
        ScanOutcome::Halted => "⚠️ Halted, Discord did not return history. Run `/scan` to resume.",
    };
    embed
        .field("Result", status, false)
        .field("Scanned", report.processed.to_string(), true)
        .field("New", report.created.to_string(), true)
        .field("Updated", report.updated.to_string(), true)
        .field("Removed", report.deleted.to_string(), true)
}

/// Advanced. Group 1 is the quote, group 2 the author; `reverse` swaps them
#[poise::command(
    slash_command,
    rename = "setquoteregex",
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn set_quote_regex(
    ctx: Context<'_>,
    #[description = "Regular expression with two capture groups"] regex: String,
    #[description = "Group 1 is the author instead of the quote"] reverse: Option<bool>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let reverse = reverse.unwrap_or(false);

    if let Err(e) = ctx
        .data()
        .quotes
        .set_custom_pattern(guild_id.get(), &regex, reverse)
        .await
    {
        return reply_quote_error(ctx, e).await;
    }

    let order = if reverse { "author, quote" } else { "quote, author" };
    ctx.say(format!(
        "✅ Quote regex set to {} (groups: {}).",
        code_span(&regex),
        order
    ))
    .await?;
    Ok(())
}

/// Go back to the built-in quote formats
#[poise::command(
    slash_command,
    rename = "clearquoteregex",
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn clear_quote_regex(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if let Err(e) = ctx.data().quotes.clear_custom_pattern(guild_id.get()).await {
        return reply_quote_error(ctx, e).await;
    }
    ctx.say("✅ Custom quote regex removed, using the built-in formats.")
        .await?;
    Ok(())
}

/// Clear all quotes from the database
#[poise::command(
    slash_command,
    rename = "clearquotes",
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn clear_quotes(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let confirm_id = format!("confirm_clear_{}", ctx.id());
    let cancel_id = format!("cancel_clear_{}", ctx.id());

    let embed = serenity::CreateEmbed::new()
        .title("Clear Quotes")
        .description("Are you sure you want to clear all quotes from the database?")
        .color(0xED4245);
    let reply = ctx
        .send(
            poise::CreateReply::default()
                .embed(embed)
                .ephemeral(true)
                .components(vec![serenity::CreateActionRow::Buttons(vec![
                    serenity::CreateButton::new(confirm_id.clone())
                        .label("Confirm")
                        .style(serenity::ButtonStyle::Danger),
                    serenity::CreateButton::new(cancel_id.clone())
                        .label("Cancel")
                        .style(serenity::ButtonStyle::Primary),
                ])]),
        )
        .await?;
    let message = reply.message().await?;

    loop {
        let Some(interaction) = message
            .await_component_interaction(ctx.serenity_context())
            .custom_ids(vec![confirm_id.clone(), cancel_id.clone()])
            .timeout(ctx.data().config.interaction_timeout)
            .await
        else {
            reply
                .edit(
                    ctx,
                    poise::CreateReply::default()
                        .content("⌛ Timed out, nothing was cleared.")
                        .components(vec![]),
                )
                .await?;
            return Ok(());
        };

        if interaction.user.id != ctx.author().id {
            interaction
                .create_response(
                    ctx.serenity_context(),
                    serenity::CreateInteractionResponse::Message(
                        serenity::CreateInteractionResponseMessage::new()
                            .content("You are not allowed to use this button.")
                            .ephemeral(true),
                    ),
                )
                .await?;
            continue;
        }

        if interaction.data.custom_id != confirm_id {
            interaction
                .create_response(
                    ctx.serenity_context(),
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .content("Cancelled.")
                            .embeds(vec![])
                            .components(vec![]),
                    ),
                )
                .await?;
            return Ok(());
        }

        interaction
            .create_response(
                ctx.serenity_context(),
                serenity::CreateInteractionResponse::UpdateMessage(
                    serenity::CreateInteractionResponseMessage::new()
                        .content("🧹 Clearing quotes...")
                        .embeds(vec![])
                        .components(vec![]),
                ),
            )
            .await?;
        let text = match ctx.data().quotes.clear_all(guild_id.get()).await {
            Ok(removed) => format!("🗑️ Cleared **{}** quotes.", removed),
            Err(e) => match e.user_message() {
                Some(text) => text,
                None => return Err(e.into()),
            },
        };
        interaction
            .edit_response(
                ctx.serenity_context(),
                serenity::EditInteractionResponse::new().content(text),
            )
            .await?;
        return Ok(());
    }
}

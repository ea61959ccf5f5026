use super::reply_quote_error;
use crate::discord_text::code_span;
use crate::platform::snowflake_time;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Get information about the guild
#[poise::command(slash_command, rename = "guildinfo", guild_only)]
pub async fn guild_info(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let info = match ctx.data().quotes.guild_info(guild_id.get()).await {
        Ok(info) => info,
        Err(e) => return reply_quote_error(ctx, e).await,
    };
    let guild_name = ctx
        .guild()
        .map(|g| g.name.clone())
        .unwrap_or_else(|| guild_id.to_string());

    let channel = info
        .config
        .quote_channel_id
        .map(|id| format!("<#{}>", id))
        .unwrap_or_else(|| "Not set".to_string());
    let pattern = info
        .config
        .custom_pattern
        .as_deref()
        .map(code_span)
        .unwrap_or_else(|| "Built-in formats".to_string());
    // The cursor is a message id; show when that message was written.
    let cursor = match info.config.backfill_cursor {
        Some(id) => format!("<t:{}:f> (`{}`)", snowflake_time(id).timestamp(), id),
        None => "Never scanned".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title("Guild Info")
        .description(format!("Information about the guild {}", guild_name))
        .field("Guild ID", guild_id.to_string(), false)
        .field("Quote Channel", channel, false)
        .field("Quote Regex", pattern, true)
        .field(
            "Reversed Groups",
            if info.config.custom_pattern_reversed { "Yes" } else { "No" },
            true,
        )
        .field("Quotes Processed Until", cursor, false)
        .field("Quotes Processed", info.quote_count.to_string(), true)
        .field(
            "Scan Running",
            if info.scanning { "Yes" } else { "No" },
            true,
        )
        .color(0x5865F2);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

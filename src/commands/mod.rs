pub mod admin;
pub mod quotes;
pub mod settings;

use crate::error::QuoteError;
use crate::{Context, Error};

/// Tells the user about expected failures; anything else goes to the
/// framework's error handler.
pub(crate) async fn reply_quote_error(ctx: Context<'_>, err: QuoteError) -> Result<(), Error> {
    match err.user_message() {
        Some(text) => {
            ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
                .await?;
            Ok(())
        }
        None => Err(err.into()),
    }
}

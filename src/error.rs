use thiserror::Error;

/// Failures surfaced to the command layer.
///
/// Extraction misses and marker failures never show up here: the first is a
/// normal outcome, the second is logged and swallowed where it happens.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("no quote channel is configured for this server")]
    NoQuoteChannel,
    #[error("a scan is already running for this server")]
    ScanAlreadyRunning,
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("no quotes found for this server")]
    NoQuotes,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl QuoteError {
    /// Message shown to the invoking user, `None` for internal failures that
    /// should go through the framework's error path instead.
    pub fn user_message(&self) -> Option<String> {
        match self {
            QuoteError::NoQuoteChannel => {
                Some("❌ Please set a quote channel first with `/setquotechannel`.".to_string())
            }
            QuoteError::ScanAlreadyRunning => {
                Some("⏳ A scan is already running for this server.".to_string())
            }
            QuoteError::InvalidPattern(reason) => Some(format!("❌ Invalid pattern: {}", reason)),
            QuoteError::NoQuotes => Some("📭 No quotes found in the database.".to_string()),
            QuoteError::Storage(_) => None,
        }
    }
}

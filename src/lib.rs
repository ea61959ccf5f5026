pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod discord_text;
pub mod error;
pub mod events;
pub mod platform;
pub mod quotes;
pub mod render;
pub mod services;

#[cfg(test)]
mod testing;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub quotes: services::QuoteService,
    /// `None` when the card fonts could not be loaded; `/guess` then sends
    /// text only.
    pub renderer: Option<Arc<render::QuoteRenderer>>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

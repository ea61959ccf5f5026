use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    /// Guilds to register commands in. Empty means global registration.
    pub guild_ids: Vec<u64>,
    pub status_message: String,

    // Backfill settings
    pub default_scan_limit: usize,
    pub scan_page_size: u8,
    pub scan_page_delay: Duration,

    // Marker & interaction settings
    pub no_match_marker_duration: Duration,
    pub interaction_timeout: Duration,

    // Database connection retry
    pub db_connect_attempts: u32,
    pub db_connect_backoff: Duration,

    // Quote card fonts
    pub font_bold_path: String,
    pub font_regular_path: String,
}

/// Discord caps a single history request at 100 messages.
pub const MAX_PAGE_SIZE: u8 = 100;

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/quotr.db".to_string()),
            guild_ids: parse_id_list(&env::var("GUILD_IDS").unwrap_or_default())?,
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Collecting quotes".to_string()),
            default_scan_limit: env::var("DEFAULT_SCAN_LIMIT")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            scan_page_size: env::var("SCAN_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(MAX_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            scan_page_delay: duration_var("SCAN_PAGE_DELAY", "500ms")?,
            no_match_marker_duration: duration_var("NO_MATCH_MARKER_DURATION", "5s")?,
            interaction_timeout: duration_var("INTERACTION_TIMEOUT", "120s")?,
            db_connect_attempts: env::var("DB_CONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            db_connect_backoff: duration_var("DB_CONNECT_BACKOFF", "5s")?,
            font_bold_path: env::var("FONT_BOLD_PATH")
                .unwrap_or_else(|_| "assets/ggsans-Bold.ttf".to_string()),
            font_regular_path: env::var("FONT_REGULAR_PATH")
                .unwrap_or_else(|_| "assets/ggsans-Normal.ttf".to_string()),
        })
    }
}

fn duration_var(key: &str, default: &str) -> anyhow::Result<Duration> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    humantime::parse_duration(raw.trim())
        .map_err(|e| anyhow::anyhow!("{} must be a duration like `{}`: {}", key, default, e))
}

fn parse_id_list(raw: &str) -> anyhow::Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| anyhow::anyhow!("GUILD_IDS entry '{}' is not a valid id", s))
        })
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("guild_ids", &self.guild_ids)
            .field("status_message", &self.status_message)
            .field("default_scan_limit", &self.default_scan_limit)
            .field("scan_page_size", &self.scan_page_size)
            .field("scan_page_delay", &self.scan_page_delay)
            .field("no_match_marker_duration", &self.no_match_marker_duration)
            .field("interaction_timeout", &self.interaction_timeout)
            .field("db_connect_attempts", &self.db_connect_attempts)
            .field("db_connect_backoff", &self.db_connect_backoff)
            .field("font_bold_path", &self.font_bold_path)
            .field("font_regular_path", &self.font_regular_path)
            .finish()
    }
}

/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;
/// Embed field values are capped at 1024 characters
pub const DISCORD_FIELD_LIMIT: usize = 1024;

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        discord_token: "test".to_string(),
        database_url: ":memory:".to_string(),
        guild_ids: Vec::new(),
        status_message: "test".to_string(),
        default_scan_limit: 500,
        scan_page_size: MAX_PAGE_SIZE,
        scan_page_delay: Duration::ZERO,
        no_match_marker_duration: Duration::from_millis(1),
        interaction_timeout: Duration::from_secs(1),
        db_connect_attempts: 1,
        db_connect_backoff: Duration::ZERO,
        font_bold_path: "missing.ttf".to_string(),
        font_regular_path: "missing.ttf".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Missing token
        env::remove_var("DISCORD_TOKEN");
        assert!(Config::build().is_err(), "Should fail when the token is missing");

        // 2. Defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.default_scan_limit, 500);
        assert_eq!(config.scan_page_size, 100);
        assert_eq!(config.scan_page_delay, Duration::from_millis(500));
        assert_eq!(config.no_match_marker_duration, Duration::from_secs(5));
        assert!(config.guild_ids.is_empty());

        // 3. Overrides
        env::set_var("GUILD_IDS", "1, 2,3");
        env::set_var("SCAN_PAGE_SIZE", "250");
        env::set_var("SCAN_PAGE_DELAY", "2s");
        let config = Config::build().unwrap();
        assert_eq!(config.guild_ids, vec![1, 2, 3]);
        assert_eq!(config.scan_page_size, 100);
        assert_eq!(config.scan_page_delay, Duration::from_secs(2));

        // 4. Debug redaction
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("test_token"));
        assert!(debug_output.contains("[REDACTED]"));

        // 5. Bad values
        env::set_var("GUILD_IDS", "abc");
        assert!(Config::build().is_err());
        env::remove_var("GUILD_IDS");
        env::set_var("SCAN_PAGE_DELAY", "soon");
        assert!(Config::build().is_err());

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("SCAN_PAGE_SIZE");
        env::remove_var("SCAN_PAGE_DELAY");
    }
}

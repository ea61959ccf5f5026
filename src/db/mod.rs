pub mod models;
pub mod schema;

pub use models::{GuildConfig, QuoteRecord};

use crate::config::Config;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Result, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Keyed persistence for guild settings and quotes.
///
/// Mutations are idempotent per key. Conflicts (creating an existing quote,
/// updating or deleting a missing one) are logged no-ops reported through the
/// returned `bool`, never errors.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn get_or_create_guild_config(&self, guild_id: u64) -> anyhow::Result<GuildConfig>;
    async fn get_guild_config(&self, guild_id: u64) -> anyhow::Result<Option<GuildConfig>>;
    /// Removes the guild and, by cascade, all of its quotes.
    async fn delete_guild_config(&self, guild_id: u64) -> anyhow::Result<()>;
    /// Saves channel and pattern settings. The backfill cursor is only moved
    /// through [`QuoteStore::advance_backfill_cursor`] and
    /// [`QuoteStore::reset_backfill_cursor`].
    async fn save_guild_config(&self, config: &GuildConfig) -> anyhow::Result<()>;
    /// Moves the cursor to `cursor` if that is older than the stored one.
    async fn advance_backfill_cursor(&self, guild_id: u64, cursor: u64) -> anyhow::Result<bool>;
    async fn reset_backfill_cursor(&self, guild_id: u64) -> anyhow::Result<()>;

    async fn get_quote(&self, message_id: u64) -> anyhow::Result<Option<QuoteRecord>>;
    async fn create_quote(&self, record: &QuoteRecord) -> anyhow::Result<bool>;
    async fn update_quote(&self, message_id: u64, content: &str, author: &str)
        -> anyhow::Result<bool>;
    async fn delete_quote(&self, message_id: u64) -> anyhow::Result<bool>;
    async fn list_quotes(&self, guild_id: u64) -> anyhow::Result<Vec<QuoteRecord>>;
    async fn random_quote(&self, guild_id: u64) -> anyhow::Result<Option<QuoteRecord>>;
    async fn count_quotes(&self, guild_id: u64) -> anyhow::Result<usize>;
    async fn delete_all_quotes(&self, guild_id: u64) -> anyhow::Result<usize>;
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens and initializes the database, retrying a bounded number of times.
    pub async fn connect_with_retry(config: &Config) -> anyhow::Result<Self> {
        if config.database_url != ":memory:" {
            if let Some(parent) = Path::new(&config.database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let attempts = config.db_connect_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!("Database: Connecting (attempt {}/{})...", attempt, attempts);
            let result = Self::new(config)
                .map_err(anyhow::Error::from)
                .and_then(|db| db.execute_init().map(|_| db));
            match result {
                Ok(db) => {
                    info!("Database: Connected to {}", config.database_url);
                    return Ok(db);
                }
                Err(e) if attempt < attempts => {
                    warn!("Database: Connection failed: {}", e);
                    tokio::time::sleep(config.db_connect_backoff).await;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "Could not connect to the database after {} attempts",
                        attempts
                    )));
                }
            }
        }
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a blocking database call on the blocking thread pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    // --- Guilds ---

    pub fn ensure_guild(&self, guild_id: u64) -> anyhow::Result<GuildConfig> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO guilds (guild_id) VALUES (?1)",
            (guild_id.to_string(),),
        )?;
        let config = conn
            .query_row(
                "SELECT guild_id, quote_channel_id, custom_pattern, custom_pattern_reversed, backfill_cursor
                 FROM guilds WHERE guild_id = ?1",
                (guild_id.to_string(),),
                guild_from_row,
            )?;
        Ok(config)
    }

    pub fn find_guild(&self, guild_id: u64) -> anyhow::Result<Option<GuildConfig>> {
        let conn = self.conn.lock().unwrap();
        let config = conn
            .query_row(
                "SELECT guild_id, quote_channel_id, custom_pattern, custom_pattern_reversed, backfill_cursor
                 FROM guilds WHERE guild_id = ?1",
                (guild_id.to_string(),),
                guild_from_row,
            )
            .optional()?;
        Ok(config)
    }

    pub fn remove_guild(&self, guild_id: u64) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM guilds WHERE guild_id = ?1",
            (guild_id.to_string(),),
        )?;
        Ok(count)
    }

    pub fn upsert_guild_settings(&self, config: &GuildConfig) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO guilds (guild_id, quote_channel_id, custom_pattern, custom_pattern_reversed, updated_at)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
             ON CONFLICT(guild_id) DO UPDATE SET
                quote_channel_id = ?2,
                custom_pattern = ?3,
                custom_pattern_reversed = ?4,
                updated_at = CURRENT_TIMESTAMP",
            (
                config.guild_id.to_string(),
                config.quote_channel_id.map(|id| id.to_string()),
                config.custom_pattern.as_deref(),
                config.custom_pattern_reversed,
            ),
        )?;
        Ok(())
    }

    pub fn move_cursor_back(&self, guild_id: u64, cursor: u64) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE guilds SET backfill_cursor = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE guild_id = ?1 AND (backfill_cursor IS NULL OR backfill_cursor > ?2)",
            (guild_id.to_string(), cursor as i64),
        )?;
        Ok(changed > 0)
    }

    pub fn clear_cursor(&self, guild_id: u64) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE guilds SET backfill_cursor = NULL, updated_at = CURRENT_TIMESTAMP WHERE guild_id = ?1",
            (guild_id.to_string(),),
        )?;
        Ok(())
    }

    // --- Quotes ---

    pub fn find_quote(&self, message_id: u64) -> anyhow::Result<Option<QuoteRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT message_id, guild_id, author, content FROM quotes WHERE message_id = ?1",
                (message_id.to_string(),),
                quote_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn insert_quote(&self, record: &QuoteRecord) -> anyhow::Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO guilds (guild_id) VALUES (?1)",
            (record.guild_id.to_string(),),
        )?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO quotes (message_id, guild_id, author, content) VALUES (?1, ?2, ?3, ?4)",
            (
                record.message_id.to_string(),
                record.guild_id.to_string(),
                &record.author,
                &record.content,
            ),
        )?;
        tx.commit()?;

        if inserted == 0 {
            warn!(
                "Database: Quote for message {} already exists, not creating",
                record.message_id
            );
        }
        Ok(inserted > 0)
    }

    pub fn set_quote_text(&self, message_id: u64, content: &str, author: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE quotes SET content = ?2, author = ?3, updated_at = CURRENT_TIMESTAMP WHERE message_id = ?1",
            (message_id.to_string(), content, author),
        )?;
        if updated == 0 {
            warn!("Database: No quote for message {} to update", message_id);
        }
        Ok(updated > 0)
    }

    pub fn remove_quote(&self, message_id: u64) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM quotes WHERE message_id = ?1",
            (message_id.to_string(),),
        )?;
        if deleted == 0 {
            debug!("Database: No quote for message {} to delete", message_id);
        }
        Ok(deleted > 0)
    }

    pub fn quotes_for_guild(&self, guild_id: u64) -> anyhow::Result<Vec<QuoteRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT message_id, guild_id, author, content FROM quotes
             WHERE guild_id = ?1 ORDER BY CAST(message_id AS INTEGER) DESC",
        )?;
        let rows = stmt.query_map((guild_id.to_string(),), quote_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn pick_random_quote(&self, guild_id: u64) -> anyhow::Result<Option<QuoteRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT message_id, guild_id, author, content FROM quotes
                 WHERE guild_id = ?1 ORDER BY RANDOM() LIMIT 1",
                (guild_id.to_string(),),
                quote_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn quote_count(&self, guild_id: u64) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM quotes WHERE guild_id = ?1",
            (guild_id.to_string(),),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn purge_quotes(&self, guild_id: u64) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM quotes WHERE guild_id = ?1",
            (guild_id.to_string(),),
        )?;
        Ok(count)
    }
}

#[async_trait]
impl QuoteStore for Database {
    async fn get_or_create_guild_config(&self, guild_id: u64) -> anyhow::Result<GuildConfig> {
        self.run_blocking(move |db| db.ensure_guild(guild_id)).await
    }

    async fn get_guild_config(&self, guild_id: u64) -> anyhow::Result<Option<GuildConfig>> {
        self.run_blocking(move |db| db.find_guild(guild_id)).await
    }

    async fn delete_guild_config(&self, guild_id: u64) -> anyhow::Result<()> {
        let removed = self.run_blocking(move |db| db.remove_guild(guild_id)).await?;
        if removed == 0 {
            debug!("Database: Guild {} had no stored config", guild_id);
        }
        Ok(())
    }

    async fn save_guild_config(&self, config: &GuildConfig) -> anyhow::Result<()> {
        let config = config.clone();
        self.run_blocking(move |db| db.upsert_guild_settings(&config))
            .await
    }

    async fn advance_backfill_cursor(&self, guild_id: u64, cursor: u64) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.move_cursor_back(guild_id, cursor))
            .await
    }

    async fn reset_backfill_cursor(&self, guild_id: u64) -> anyhow::Result<()> {
        self.run_blocking(move |db| db.clear_cursor(guild_id)).await
    }

    async fn get_quote(&self, message_id: u64) -> anyhow::Result<Option<QuoteRecord>> {
        self.run_blocking(move |db| db.find_quote(message_id)).await
    }

    async fn create_quote(&self, record: &QuoteRecord) -> anyhow::Result<bool> {
        let record = record.clone();
        self.run_blocking(move |db| db.insert_quote(&record)).await
    }

    async fn update_quote(
        &self,
        message_id: u64,
        content: &str,
        author: &str,
    ) -> anyhow::Result<bool> {
        let content = content.to_string();
        let author = author.to_string();
        self.run_blocking(move |db| db.set_quote_text(message_id, &content, &author))
            .await
    }

    async fn delete_quote(&self, message_id: u64) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.remove_quote(message_id)).await
    }

    async fn list_quotes(&self, guild_id: u64) -> anyhow::Result<Vec<QuoteRecord>> {
        self.run_blocking(move |db| db.quotes_for_guild(guild_id)).await
    }

    async fn random_quote(&self, guild_id: u64) -> anyhow::Result<Option<QuoteRecord>> {
        self.run_blocking(move |db| db.pick_random_quote(guild_id))
            .await
    }

    async fn count_quotes(&self, guild_id: u64) -> anyhow::Result<usize> {
        self.run_blocking(move |db| db.quote_count(guild_id)).await
    }

    async fn delete_all_quotes(&self, guild_id: u64) -> anyhow::Result<usize> {
        self.run_blocking(move |db| db.purge_quotes(guild_id)).await
    }
}

fn id_column(row: &Row<'_>, idx: usize) -> Result<u64> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn optional_id_column(row: &Row<'_>, idx: usize) -> Result<Option<u64>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        raw.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

fn guild_from_row(row: &Row<'_>) -> Result<GuildConfig> {
    let cursor: Option<i64> = row.get(4)?;
    Ok(GuildConfig {
        guild_id: id_column(row, 0)?,
        quote_channel_id: optional_id_column(row, 1)?,
        custom_pattern: row.get(2)?,
        custom_pattern_reversed: row.get(3)?,
        backfill_cursor: cursor.map(|c| c as u64),
    })
}

fn quote_from_row(row: &Row<'_>) -> Result<QuoteRecord> {
    Ok(QuoteRecord {
        message_id: id_column(row, 0)?,
        guild_id: id_column(row, 1)?,
        author: row.get(2)?,
        content: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn test_db() -> Database {
        let db = Database::new(&test_config()).unwrap();
        db.execute_init().unwrap();
        db
    }

    fn quote(message_id: u64, guild_id: u64, content: &str, author: &str) -> QuoteRecord {
        QuoteRecord {
            message_id,
            guild_id,
            author: author.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_guild_config_lifecycle() {
        let db = test_db();

        assert_eq!(db.get_guild_config(1).await.unwrap(), None);

        let config = db.get_or_create_guild_config(1).await.unwrap();
        assert_eq!(config, GuildConfig::new(1));

        let mut updated = config.clone();
        updated.quote_channel_id = Some(42);
        updated.custom_pattern = Some(r"(.+) ~ (.+)".to_string());
        updated.custom_pattern_reversed = true;
        db.save_guild_config(&updated).await.unwrap();
        assert_eq!(db.get_guild_config(1).await.unwrap(), Some(updated));

        db.delete_guild_config(1).await.unwrap();
        assert_eq!(db.get_guild_config(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quote_round_trip() {
        let db = test_db();
        let record = quote(10, 1, "\"line one\"\n\"line two\"", "Ich");

        assert!(db.create_quote(&record).await.unwrap());
        let stored = db.get_quote(10).await.unwrap().unwrap();
        assert_eq!(stored.content, record.content);
        assert_eq!(stored.author, record.author);

        // Conflicting create is a no-op.
        assert!(!db.create_quote(&quote(10, 1, "other", "Someone")).await.unwrap());
        assert_eq!(db.get_quote(10).await.unwrap().unwrap(), record);

        assert!(db.update_quote(10, "new", "Jonathan").await.unwrap());
        let stored = db.get_quote(10).await.unwrap().unwrap();
        assert_eq!((stored.content.as_str(), stored.author.as_str()), ("new", "Jonathan"));

        assert!(!db.update_quote(99, "x", "y").await.unwrap());
        assert!(db.delete_quote(10).await.unwrap());
        assert!(!db.delete_quote(10).await.unwrap());
        assert_eq!(db.get_quote(10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cursor_only_moves_back() {
        let db = test_db();
        db.get_or_create_guild_config(1).await.unwrap();

        assert!(db.advance_backfill_cursor(1, 500).await.unwrap());
        assert!(db.advance_backfill_cursor(1, 300).await.unwrap());
        assert!(!db.advance_backfill_cursor(1, 400).await.unwrap());
        assert!(!db.advance_backfill_cursor(1, 300).await.unwrap());
        let config = db.get_guild_config(1).await.unwrap().unwrap();
        assert_eq!(config.backfill_cursor, Some(300));

        // Saving settings leaves the cursor alone.
        let mut settings = config.clone();
        settings.backfill_cursor = None;
        settings.quote_channel_id = Some(7);
        db.save_guild_config(&settings).await.unwrap();
        assert_eq!(
            db.get_guild_config(1).await.unwrap().unwrap().backfill_cursor,
            Some(300)
        );

        db.reset_backfill_cursor(1).await.unwrap();
        assert_eq!(
            db.get_guild_config(1).await.unwrap().unwrap().backfill_cursor,
            None
        );
    }

    #[tokio::test]
    async fn test_cursor_handles_large_snowflakes() {
        let db = test_db();
        db.get_or_create_guild_config(1).await.unwrap();
        let snowflake = 1_234_567_890_123_456_789;
        db.advance_backfill_cursor(1, snowflake).await.unwrap();
        assert_eq!(
            db.get_guild_config(1).await.unwrap().unwrap().backfill_cursor,
            Some(snowflake)
        );
    }

    #[tokio::test]
    async fn test_guild_scoped_bulk_operations() {
        let db = test_db();
        db.create_quote(&quote(1, 100, "a", "A")).await.unwrap();
        db.create_quote(&quote(2, 100, "b", "B")).await.unwrap();
        db.create_quote(&quote(3, 200, "c", "C")).await.unwrap();

        assert_eq!(db.count_quotes(100).await.unwrap(), 2);
        let listed: Vec<_> = db
            .list_quotes(100)
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.message_id)
            .collect();
        assert_eq!(listed, vec![2, 1]);

        let random = db.random_quote(100).await.unwrap().unwrap();
        assert_eq!(random.guild_id, 100);
        assert_eq!(db.random_quote(300).await.unwrap(), None);

        assert_eq!(db.delete_all_quotes(100).await.unwrap(), 2);
        assert_eq!(db.count_quotes(100).await.unwrap(), 0);
        assert_eq!(db.count_quotes(200).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deleting_guild_cascades() {
        let db = test_db();
        db.create_quote(&quote(1, 100, "a", "A")).await.unwrap();
        db.delete_guild_config(100).await.unwrap();
        assert_eq!(db.get_quote(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_with_retry_in_memory() {
        let db = Database::connect_with_retry(&test_config()).await.unwrap();
        assert_eq!(db.count_quotes(1).await.unwrap(), 0);
    }
}

//! SQLite connection pools in WAL mode.
//!
//! Only one connection may write at a time, so the writer pool holds a
//! single connection while readers share a small pool. Credential rows are
//! rewritten whenever the network rotates key material; writes are
//! frequent but tiny.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const DATABASE_FILE: &str = "linkbot.db";
const READER_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if needed) `{data_dir}/linkbot.db`.
    pub async fn open(data_dir: &Path) -> Result<Self, sqlx::Error> {
        Self::new(&format!("{}?mode=rwc", database_url(data_dir))).await
    }

    /// Connect to `database_url`, migrating through the writer before any
    /// reader connects.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(options.read_only(true))
            .await?;

        Ok(Self { reader, writer })
    }
}

/// `sqlite://{data_dir}/linkbot.db`
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}", data_dir.join(DATABASE_FILE).display())
}

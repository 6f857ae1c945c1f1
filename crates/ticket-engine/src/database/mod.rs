//! # SQLite Persistence
//!
//! [`SqliteStore`] implements every repository trait on top of a sqlx
//! [`SqlitePool`]. The schema is created on connect (see [`schema`]).
//!
//! ## Storage conventions
//!
//! - identifiers are stored as hyphenated UUID text
//! - timestamps are stored as fixed-width RFC 3339 UTC text with microsecond
//!   precision, so string comparison in SQL matches time order
//! - provider skills and coordinates are JSON text columns; an unreadable
//!   value is logged and loads as "no skills" or "no location", so one bad
//!   row never fails a pool query
//!
//! ## Concurrency
//!
//! Assignment, rejection, acceptance and completion commits run in a
//! transaction whose first statement is a guarded `UPDATE`, which takes
//! SQLite's write lock up front. A ticket that is no longer in the expected
//! status shows as zero rows affected and the transaction is rolled back, so
//! a completion releases provider load at most once. On assignment the
//! provider update only matches while `current_load < capacity_per_day`, so a
//! provider that filled up concurrently is rolled back the same way.
//!
//! Open escalations are unique per (ticket, trigger) through a partial unique
//! index, which keeps several sweepers sharing one database from inserting
//! duplicates.

pub mod assignments;
pub mod escalations;
pub mod providers;
pub mod schema;
pub mod tickets;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{Result, TicketEngineError};

/// Repository backend on SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect using the database section of the engine configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Opening ticket database at: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true);

        // Every connection to `sqlite::memory:` opens its own empty database,
        // so an in-memory pool is pinned to one long-lived connection.
        let in_memory = config.url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.initialize_schema().await?;

        info!("✅ Ticket database ready");
        Ok(store)
    }

    /// Open a file-backed database, creating it when missing
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.as_ref().display()),
            ..Default::default()
        };
        Self::connect(&config).await
    }

    /// Create an in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig::default()).await
    }

    /// Create all tables and indexes
    pub async fn initialize_schema(&self) -> Result<()> {
        schema::initialize_schema(&self.pool).await
    }

    /// Run a trivial query against the pool
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Fixed-width timestamp text
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TicketEngineError::internal(format!("bad timestamp '{}': {}", text, e)))
}

pub(crate) fn parse_opt_ts(text: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    text.map(parse_ts).transpose()
}

pub(crate) fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| TicketEngineError::internal(format!("bad id '{}': {}", text, e)))
}

pub(crate) fn parse_opt_uuid(text: Option<&str>) -> Result<Option<Uuid>> {
    text.map(parse_uuid).transpose()
}

pub(crate) fn parse_label<T>(text: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    text.parse().map_err(TicketEngineError::internal)
}

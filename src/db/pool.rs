//! Database connection pool abstraction
//!
//! A single `DatabasePool` trait object is created at startup and injected
//! into every repository. SQLite is the default backend; MySQL is selected
//! through configuration.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_DEFAULT_CONNECTIONS: u32 = 20;
const MYSQL_DEFAULT_CONNECTIONS: u32 = 30;

/// Storage handle shared by the repositories.
///
/// Repositories pick the concrete pool through `as_sqlite`/`as_mysql` and
/// issue driver-specific SQL; the remaining methods serve migrations, the
/// health probe and shutdown.
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Run one statement and report the affected row count
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Round-trip a trivial query
    async fn ping(&self) -> Result<()>;

    /// Wait for checked-out connections and close the pool
    async fn close(&self);

    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;
}

/// SQLite-backed storage
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (creating if needed) the database described by `config`.
    ///
    /// Foreign keys are switched on for every connection so deleting an
    /// account cascades to its sessions and favorites.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = is_memory_url(&config.url);
        if !in_memory {
            ensure_parent_dir(&config.url)?;
        }

        // `:memory:` gives each connection its own database, so that pool is
        // pinned to a single connection that never expires.
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections.unwrap_or(SQLITE_DEFAULT_CONNECTIONS))
        };

        let pool = options
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await?;
                    Ok(())
                })
            })
            .connect(&sqlite_connect_url(&config.url))
            .await
            .with_context(|| format!("Failed to open SQLite database at {}", config.url))?;

        Ok(Self { pool })
    }
}

fn is_memory_url(url: &str) -> bool {
    url == ":memory:" || url.starts_with("sqlite::memory:")
}

/// Normalize a configured location into a sqlx SQLite URL.
///
/// Bare paths and `sqlite:` URLs without options open in read-write-create
/// mode; explicit query options are kept as given.
fn sqlite_connect_url(url: &str) -> String {
    if is_memory_url(url) {
        return "sqlite::memory:".to_string();
    }
    match url.strip_prefix("sqlite:") {
        Some(_) if url.contains('?') => url.to_string(),
        Some(rest) => format!("sqlite:{}?mode=rwc", rest),
        None => format!("sqlite:{}?mode=rwc", url),
    }
}

fn ensure_parent_dir(url: &str) -> Result<()> {
    let path = url.trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display())),
        _ => Ok(()),
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let done = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Statement failed: {}", query))?;
        Ok(done.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("SQLite did not answer")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }
}

/// MySQL-backed storage
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = if config.url.starts_with("mysql://") {
            config.url.clone()
        } else {
            format!("mysql://{}", config.url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(MYSQL_DEFAULT_CONNECTIONS))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&url)
            .await
            .context("Failed to connect to MySQL")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let done = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Statement failed: {}", query))?;
        Ok(done.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("MySQL did not answer")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Connect to the configured backend
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(SqliteDatabase::connect(config).await?),
        DatabaseDriver::Mysql => Arc::new(MysqlDatabase::connect(config).await?),
    };
    Ok(pool)
}

/// Fresh in-memory SQLite database, used by tests
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    create_pool(&DatabaseConfig::sqlite(":memory:")).await
}

/// Borrow the SQLite pool, failing instead of panicking on a driver mismatch
pub(crate) fn sqlite(pool: &DynDatabasePool) -> Result<&SqlitePool> {
    pool.as_sqlite()
        .ok_or_else(|| anyhow::anyhow!("Database pool is not SQLite"))
}

/// Borrow the MySQL pool, failing instead of panicking on a driver mismatch
pub(crate) fn mysql(pool: &DynDatabasePool) -> Result<&MySqlPool> {
    pool.as_mysql()
        .ok_or_else(|| anyhow::anyhow!("Database pool is not MySQL"))
}

/// Whether an error chain bottoms out in a unique-constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    }
}

//! Database migrations module
//!
//! Migrations are embedded in the binary as SQL strings, one variant per
//! backend, and tracked in the `_migrations` table.
//!
//! # Usage
//!
//! ```ignore
//! use wanderlist::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeSet;

use super::pool::{mysql, sqlite};
use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

impl Migration {
    fn sql_for(&self, driver: DatabaseDriver) -> &'static str {
        match driver {
            DatabaseDriver::Sqlite => self.up_sqlite,
            DatabaseDriver::Mysql => self.up_mysql,
        }
    }
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    // Emails are stored lowercased, so the UNIQUE constraint is case-insensitive in effect.
    Migration {
        version: 1,
        name: "create_accounts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id VARCHAR(36) PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                secret_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id CHAR(36) PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                secret_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
        "#,
    },
    // Only the SHA-256 digest of a session token is persisted.
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token_hash CHAR(64) PRIMARY KEY,
                account_id VARCHAR(36) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_account_id ON sessions(account_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token_hash CHAR(64) PRIMARY KEY,
                account_id CHAR(36) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_account_id ON sessions(account_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    // The composite primary key is what makes "add to set" atomic.
    Migration {
        version: 3,
        name: "create_favorites",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS favorites (
                account_id VARCHAR(36) NOT NULL,
                country_code CHAR(3) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (account_id, country_code),
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS favorites (
                account_id CHAR(36) NOT NULL,
                country_code CHAR(3) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (account_id, country_code),
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );
        "#,
    },
];

/// Run all pending migrations, returning how many were applied.
///
/// Fails without touching the schema when the database records a version
/// this build does not know.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    let pending = pending_migrations(pool).await?;

    for migration in &pending {
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
    }

    match pending.len() {
        0 => tracing::debug!("Schema is current"),
        n => tracing::info!("Applied {} migration(s)", n),
    }

    Ok(pending.len())
}

async fn pending_migrations(pool: &DynDatabasePool) -> Result<Vec<&'static Migration>> {
    create_migrations_table(pool).await?;
    let applied = applied_versions(pool).await?;

    if let Some(unknown) = applied
        .iter()
        .find(|v| !MIGRATIONS.iter().any(|m| m.version == **v))
    {
        anyhow::bail!(
            "Database has migration version {} which this build does not know",
            unknown
        );
    }

    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect())
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

const SELECT_APPLIED: &str = "SELECT version FROM _migrations ORDER BY version";

async fn applied_versions(pool: &DynDatabasePool) -> Result<BTreeSet<i32>> {
    let versions: Vec<i64> = match pool.driver() {
        DatabaseDriver::Sqlite => sqlx::query_scalar(SELECT_APPLIED)
            .fetch_all(sqlite(pool)?)
            .await?,
        DatabaseDriver::Mysql => sqlx::query_scalar::<_, i32>(SELECT_APPLIED)
            .fetch_all(mysql(pool)?)
            .await?
            .into_iter()
            .map(i64::from)
            .collect(),
    };

    versions
        .into_iter()
        .map(|v| i32::try_from(v).context("Migration version out of range"))
        .collect()
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.sql_for(pool.driver())) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    let record = "INSERT INTO _migrations (version, name) VALUES (?, ?)";
    match pool.driver() {
        DatabaseDriver::Sqlite => {
            sqlx::query(record)
                .bind(migration.version)
                .bind(migration.name)
                .execute(sqlite(pool)?)
                .await?;
        }
        DatabaseDriver::Mysql => {
            sqlx::query(record)
                .bind(migration.version)
                .bind(migration.name)
                .execute(mysql(pool)?)
                .await?;
        }
    }

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    Ok(pending_migrations(pool).await?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date_and_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.expect("Failed to run migrations");

        assert!(is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_applied_version_is_refused() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        pool.execute("INSERT INTO _migrations (version, name) VALUES (99, 'from_the_future')")
            .await
            .unwrap();

        let err = run_migrations(&pool).await.unwrap_err();
        assert!(err.to_string().contains("99"));
    }

    #[tokio::test]
    async fn test_favorites_primary_key_rejects_duplicates() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        pool.execute(
            "INSERT INTO accounts (id, name, email, secret_hash) VALUES ('a1', 'Ann', 'ann@x.com', 'h')",
        )
        .await
        .unwrap();
        pool.execute("INSERT INTO favorites (account_id, country_code) VALUES ('a1', 'LKA')")
            .await
            .unwrap();

        let duplicate = pool
            .execute("INSERT INTO favorites (account_id, country_code) VALUES ('a1', 'LKA')")
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_deleting_account_cascades() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        pool.execute(
            "INSERT INTO accounts (id, name, email, secret_hash) VALUES ('a1', 'Ann', 'ann@x.com', 'h')",
        )
        .await
        .unwrap();
        pool.execute("INSERT INTO favorites (account_id, country_code) VALUES ('a1', 'LKA')")
            .await
            .unwrap();

        pool.execute("DELETE FROM accounts WHERE id = 'a1'").await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (x INT);\n-- just a comment\n;CREATE INDEX i ON a(x);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (x INT)", "CREATE INDEX i ON a(x)"]);
    }

    #[test]
    fn test_migration_versions_are_sequential() {
        for (idx, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, idx + 1);
        }
    }
}

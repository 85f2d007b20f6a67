//! Account repository
//!
//! Database operations for accounts.
//!
//! This module provides:
//! - `AccountRepository` trait defining the interface for account data access
//! - `SqlxAccountRepository` implementing the trait for SQLite and MySQL
//!
//! Emails are expected to arrive already normalized (see `models::normalize_email`);
//! the repository compares them byte for byte.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Account, AccountRole, AccountSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account. Fails with a unique violation if the email is taken.
    async fn create(&self, account: &Account) -> Result<Account>;

    /// Get account by ID
    async fn get_by_id(&self, id: &str) -> Result<Option<Account>>;

    /// Get account by (normalized) email
    async fn get_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Count all accounts
    async fn count(&self) -> Result<i64>;

    /// List every account with its favorite count, oldest first
    async fn list_with_favorite_counts(&self) -> Result<Vec<AccountSummary>>;
}

/// SQLx-based account repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxAccountRepository {
    pool: DynDatabasePool,
}

impl SqlxAccountRepository {
    /// Create a new SQLx account repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AccountRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn create(&self, account: &Account) -> Result<Account> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_account_sqlite(sqlite(&self.pool)?, account).await,
            DatabaseDriver::Mysql => create_account_mysql(mysql(&self.pool)?, account).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Account>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_account_by_id_sqlite(sqlite(&self.pool)?, id).await,
            DatabaseDriver::Mysql => get_account_by_id_mysql(mysql(&self.pool)?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_account_by_email_sqlite(sqlite(&self.pool)?, email).await,
            DatabaseDriver::Mysql => get_account_by_email_mysql(mysql(&self.pool)?, email).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_accounts_sqlite(sqlite(&self.pool)?).await,
            DatabaseDriver::Mysql => count_accounts_mysql(mysql(&self.pool)?).await,
        }
    }

    async fn list_with_favorite_counts(&self) -> Result<Vec<AccountSummary>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_accounts_sqlite(sqlite(&self.pool)?).await,
            DatabaseDriver::Mysql => list_accounts_mysql(mysql(&self.pool)?).await,
        }
    }
}

const ACCOUNT_COLUMNS: &str = "id, name, email, secret_hash, role, created_at, updated_at";

const LIST_WITH_COUNTS_SQL: &str = r#"
    SELECT a.id, a.name, a.email, a.secret_hash, a.role, a.created_at, a.updated_at,
           COUNT(f.country_code) AS favorite_count
    FROM accounts a
    LEFT JOIN favorites f ON f.account_id = a.id
    GROUP BY a.id, a.name, a.email, a.secret_hash, a.role, a.created_at, a.updated_at
    ORDER BY a.created_at ASC, a.email ASC
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_account_sqlite(pool: &SqlitePool, account: &Account) -> Result<Account> {
    sqlx::query(
        r#"
        INSERT INTO accounts (id, name, email, secret_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&account.id)
    .bind(&account.name)
    .bind(&account.email)
    .bind(&account.secret_hash)
    .bind(account.role.to_string())
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(pool)
    .await
    .context("Failed to create account")?;

    Ok(account.clone())
}

async fn get_account_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get account by ID")?;

    row.as_ref().map(row_to_account_sqlite).transpose()
}

async fn get_account_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE email = ?", ACCOUNT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get account by email")?;

    row.as_ref().map(row_to_account_sqlite).transpose()
}

async fn count_accounts_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM accounts")
        .fetch_one(pool)
        .await
        .context("Failed to count accounts")?;

    Ok(row.get("count"))
}

async fn list_accounts_sqlite(pool: &SqlitePool) -> Result<Vec<AccountSummary>> {
    let rows = sqlx::query(LIST_WITH_COUNTS_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to list accounts")?;

    rows.iter()
        .map(|row| {
            Ok(AccountSummary {
                account: row_to_account_sqlite(row)?,
                favorite_count: row.get("favorite_count"),
            })
        })
        .collect()
}

fn row_to_account_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let role_str: String = row.get("role");
    let role = AccountRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(Account {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        secret_hash: row.get("secret_hash"),
        role,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_account_mysql(pool: &MySqlPool, account: &Account) -> Result<Account> {
    sqlx::query(
        r#"
        INSERT INTO accounts (id, name, email, secret_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&account.id)
    .bind(&account.name)
    .bind(&account.email)
    .bind(&account.secret_hash)
    .bind(account.role.to_string())
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(pool)
    .await
    .context("Failed to create account")?;

    Ok(account.clone())
}

async fn get_account_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get account by ID")?;

    row.as_ref().map(row_to_account_mysql).transpose()
}

async fn get_account_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE email = ?", ACCOUNT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get account by email")?;

    row.as_ref().map(row_to_account_mysql).transpose()
}

async fn count_accounts_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM accounts")
        .fetch_one(pool)
        .await
        .context("Failed to count accounts")?;

    Ok(row.get("count"))
}

async fn list_accounts_mysql(pool: &MySqlPool) -> Result<Vec<AccountSummary>> {
    let rows = sqlx::query(LIST_WITH_COUNTS_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to list accounts")?;

    rows.iter()
        .map(|row| {
            Ok(AccountSummary {
                account: row_to_account_mysql(row)?,
                favorite_count: row.get("favorite_count"),
            })
        })
        .collect()
}

fn row_to_account_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Account> {
    let role_str: String = row.get("role");
    let role = AccountRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(Account {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        secret_hash: row.get("secret_hash"),
        role,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

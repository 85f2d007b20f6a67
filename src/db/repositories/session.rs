//! Session repository
//!
//! Database operations for server-held sessions. Rows are keyed by the
//! token digest, never by the bearer token itself.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by token digest
    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<Session>>;

    /// Delete a session, returning whether a row was removed
    async fn delete(&self, token_hash: &str) -> Result<bool>;

    /// Delete expired sessions
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_session_sqlite(sqlite(&self.pool)?, session).await,
            DatabaseDriver::Mysql => create_session_mysql(mysql(&self.pool)?, session).await,
        }
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_session_sqlite(sqlite(&self.pool)?, token_hash).await,
            DatabaseDriver::Mysql => get_session_mysql(mysql(&self.pool)?, token_hash).await,
        }
    }

    async fn delete(&self, token_hash: &str) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
                    .bind(token_hash)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to delete session")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
                    .bind(token_hash)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to delete session")?
                    .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
        };
        result.context("Failed to delete expired sessions")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (token_hash, account_id, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.token_hash)
    .bind(&session.account_id)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_sqlite(pool: &SqlitePool, token_hash: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT token_hash, account_id, expires_at, created_at
        FROM sessions
        WHERE token_hash = ?
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .context("Failed to get session")?;

    Ok(row.map(|row| Session {
        token_hash: row.get("token_hash"),
        account_id: row.get("account_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (token_hash, account_id, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.token_hash)
    .bind(&session.account_id)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_mysql(pool: &MySqlPool, token_hash: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT token_hash, account_id, expires_at, created_at
        FROM sessions
        WHERE token_hash = ?
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .context("Failed to get session")?;

    Ok(row.map(|row| Session {
        token_hash: row.get("token_hash"),
        account_id: row.get("account_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

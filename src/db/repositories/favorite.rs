//! Favorite repository
//!
//! Per-account favorite country codes. Membership is enforced by the
//! `(account_id, country_code)` primary key, so adding is a single atomic
//! insert-if-absent and never a read-modify-write.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::CountryCode;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Favorite repository trait
#[async_trait]
pub trait FavoriteRepository: Send + Sync {
    /// Add a code to the account's set. Returns `false` if it was already present.
    async fn add(&self, account_id: &str, code: &CountryCode) -> Result<bool>;

    /// Remove a code from the account's set. Returns `false` if it was absent.
    async fn remove(&self, account_id: &str, code: &CountryCode) -> Result<bool>;

    /// Current favorite set of an account
    async fn list(&self, account_id: &str) -> Result<Vec<CountryCode>>;

    /// Number of favorites an account has
    async fn count(&self, account_id: &str) -> Result<i64>;
}

/// SQLx-based favorite repository implementation
pub struct SqlxFavoriteRepository {
    pool: DynDatabasePool,
}

impl SqlxFavoriteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FavoriteRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl FavoriteRepository for SqlxFavoriteRepository {
    async fn add(&self, account_id: &str, code: &CountryCode) -> Result<bool> {
        let now = Utc::now();
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                r#"
                INSERT INTO favorites (account_id, country_code, created_at)
                VALUES (?, ?, ?)
                ON CONFLICT (account_id, country_code) DO NOTHING
                "#,
            )
            .bind(account_id)
            .bind(code.as_str())
            .bind(now)
            .execute(sqlite(&self.pool)?)
            .await
            .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(
                r#"
                INSERT IGNORE INTO favorites (account_id, country_code, created_at)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(account_id)
            .bind(code.as_str())
            .bind(now)
            .execute(mysql(&self.pool)?)
            .await
            .map(|r| r.rows_affected()),
        };

        let inserted = result.context("Failed to add favorite")?;
        Ok(inserted > 0)
    }

    async fn remove(&self, account_id: &str, code: &CountryCode) -> Result<bool> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM favorites WHERE account_id = ? AND country_code = ?")
                    .bind(account_id)
                    .bind(code.as_str())
                    .execute(sqlite(&self.pool)?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM favorites WHERE account_id = ? AND country_code = ?")
                    .bind(account_id)
                    .bind(code.as_str())
                    .execute(mysql(&self.pool)?)
                    .await
                    .map(|r| r.rows_affected())
            }
        };

        let removed = result.context("Failed to remove favorite")?;
        Ok(removed > 0)
    }

    async fn list(&self, account_id: &str) -> Result<Vec<CountryCode>> {
        const SQL: &str =
            "SELECT country_code FROM favorites WHERE account_id = ? ORDER BY created_at, country_code";

        let raw = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar::<_, String>(SQL)
                .bind(account_id)
                .fetch_all(sqlite(&self.pool)?)
                .await,
            DatabaseDriver::Mysql => sqlx::query_scalar::<_, String>(SQL)
                .bind(account_id)
                .fetch_all(mysql(&self.pool)?)
                .await,
        }
        .context("Failed to list favorites")?;

        raw.iter()
            .map(|code| {
                CountryCode::parse(code)
                    .with_context(|| format!("Invalid country code in database: {}", code))
            })
            .collect()
    }

    async fn count(&self, account_id: &str) -> Result<i64> {
        const SQL: &str = "SELECT COUNT(*) FROM favorites WHERE account_id = ?";

        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar::<_, i64>(SQL)
                .bind(account_id)
                .fetch_one(sqlite(&self.pool)?)
                .await,
            DatabaseDriver::Mysql => sqlx::query_scalar::<_, i64>(SQL)
                .bind(account_id)
                .fetch_one(mysql(&self.pool)?)
                .await,
        };
        count.context("Failed to count favorites")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{AccountRepository, SqlxAccountRepository};
    use crate::config::DatabaseConfig;
    use crate::db::{create_pool, create_test_pool, migrations};
    use crate::models::{Account, AccountRole};
    use std::collections::HashSet;

    async fn setup() -> (SqlxFavoriteRepository, String) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        setup_on(pool).await
    }

    async fn setup_on(pool: DynDatabasePool) -> (SqlxFavoriteRepository, String) {
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let account = Account::new("Ann".into(), "ann@x.com", "hash".into(), AccountRole::User);
        SqlxAccountRepository::new(pool.clone())
            .create(&account)
            .await
            .expect("Failed to create account");

        (SqlxFavoriteRepository::new(pool), account.id)
    }

    fn code(raw: &str) -> CountryCode {
        CountryCode::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (repo, account_id) = setup().await;

        assert!(repo.add(&account_id, &code("LKA")).await.unwrap());
        assert!(!repo.add(&account_id, &code("LKA")).await.unwrap());

        assert_eq!(repo.list(&account_id).await.unwrap(), vec![code("LKA")]);
        assert_eq!(repo.count(&account_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_returns_exact_set() {
        let (repo, account_id) = setup().await;

        repo.add(&account_id, &code("FRA")).await.unwrap();
        repo.add(&account_id, &code("LKA")).await.unwrap();

        let set: HashSet<CountryCode> = repo.list(&account_id).await.unwrap().into_iter().collect();
        assert_eq!(set, HashSet::from([code("FRA"), code("LKA")]));
    }

    #[tokio::test]
    async fn test_remove() {
        let (repo, account_id) = setup().await;

        repo.add(&account_id, &code("LKA")).await.unwrap();
        assert!(repo.remove(&account_id, &code("LKA")).await.unwrap());
        assert!(!repo.remove(&account_id, &code("LKA")).await.unwrap());
        assert!(repo.list(&account_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sets_are_per_account() {
        let (repo, account_id) = setup().await;

        repo.add(&account_id, &code("LKA")).await.unwrap();
        assert!(repo.list("someone-else").await.unwrap().is_empty());
        assert_eq!(repo.count("someone-else").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_adds_store_one_row() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = DatabaseConfig {
            max_connections: Some(8),
            ..DatabaseConfig::sqlite(dir.path().join("favorites.db").to_string_lossy())
        };
        let pool = create_pool(&config).await.expect("Failed to create file pool");
        let (repo, account_id) = setup_on(pool).await;
        let repo = Arc::new(repo);

        let results = futures::future::join_all((0..8).map(|_| {
            let repo = repo.clone();
            let account_id = account_id.clone();
            tokio::spawn(async move { repo.add(&account_id, &code("LKA")).await.unwrap() })
        }))
        .await;

        let inserted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

        assert_eq!(inserted, 1);
        assert_eq!(repo.count(&account_id).await.unwrap(), 1);
    }
}

//! Database layer
//!
//! Storage for accounts, sessions and favorite sets. SQLite is used by
//! default (single-file deployment); MySQL can be selected in configuration.
//!
//! # Usage
//!
//! ```ignore
//! use wanderlist::config::DatabaseConfig;
//! use wanderlist::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, is_unique_violation, DatabasePool, DynDatabasePool,
    MysqlDatabase, SqliteDatabase,
};

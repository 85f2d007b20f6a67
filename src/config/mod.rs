//! Configuration management
//!
//! This module handles loading and parsing configuration for the Wanderlist service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Authentication and session configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Bootstrap administrator, created at startup when absent
    #[serde(default)]
    pub admin: Option<AdminSeed>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the country browser front end)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Derive client addresses from `X-Forwarded-For`/`X-Real-IP`.
    /// Enable only behind a reverse proxy that sets those headers.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            trust_forwarded_headers: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound on pooled connections; the driver's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    /// Seconds a request waits for a free connection before failing
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    /// File-backed or in-memory SQLite at `url`, other settings default
    pub fn sqlite(url: impl Into<String>) -> Self {
        Self {
            driver: DatabaseDriver::Sqlite,
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: None,
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_database_url() -> String {
    "data/wanderlist.db".to_string()
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Longest accepted session lifetime (ten years)
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Absolute session lifetime in hours
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Minimum accepted secret length at registration
    #[serde(default = "default_min_secret_length")]
    pub min_secret_length: usize,
    /// How often the expired-session sweep runs
    #[serde(default = "default_session_cleanup_interval_secs")]
    pub session_cleanup_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            min_secret_length: default_min_secret_length(),
            session_cleanup_interval_secs: default_session_cleanup_interval_secs(),
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_min_secret_length() -> usize {
    6
}

fn default_session_cleanup_interval_secs() -> u64 {
    300
}

/// Administrator account seeded at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub secret: String,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - WANDERLIST_SERVER_HOST
    /// - WANDERLIST_SERVER_PORT
    /// - WANDERLIST_SERVER_CORS_ORIGIN
    /// - WANDERLIST_SERVER_TRUST_FORWARDED_HEADERS
    /// - WANDERLIST_DATABASE_DRIVER
    /// - WANDERLIST_DATABASE_URL
    /// - WANDERLIST_AUTH_SESSION_TTL_HOURS
    /// - WANDERLIST_ADMIN_NAME / WANDERLIST_ADMIN_EMAIL / WANDERLIST_ADMIN_SECRET
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session_ttl_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_ttl_hours must be positive".to_string(),
            ));
        }
        if self.auth.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(ConfigError::ValidationError(format!(
                "auth.session_ttl_hours must be at most {}",
                MAX_SESSION_TTL_HOURS
            )));
        }
        if self.auth.min_secret_length == 0 {
            return Err(ConfigError::ValidationError(
                "auth.min_secret_length must be at least 1".to_string(),
            ));
        }
        if self.auth.session_cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_cleanup_interval_secs must be positive".to_string(),
            ));
        }
        if self.database.max_connections == Some(0) {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if let Some(admin) = &self.admin {
            if admin.email.trim().is_empty() || admin.secret.is_empty() {
                return Err(ConfigError::ValidationError(
                    "admin.email and admin.secret are required when admin is set".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("WANDERLIST_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("WANDERLIST_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("WANDERLIST_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(trust) = std::env::var("WANDERLIST_SERVER_TRUST_FORWARDED_HEADERS") {
            if let Ok(trust) = trust.parse::<bool>() {
                self.server.trust_forwarded_headers = trust;
            }
        }

        if let Ok(driver) = std::env::var("WANDERLIST_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("WANDERLIST_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("WANDERLIST_AUTH_SESSION_TTL_HOURS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.auth.session_ttl_hours = ttl;
            }
        }

        // The seed is only taken from the environment when both login fields are present
        if let (Ok(email), Ok(secret)) = (
            std::env::var("WANDERLIST_ADMIN_EMAIL"),
            std::env::var("WANDERLIST_ADMIN_SECRET"),
        ) {
            let name = std::env::var("WANDERLIST_ADMIN_NAME")
                .unwrap_or_else(|_| "Administrator".to_string());
            self.admin = Some(AdminSeed { name, email, secret });
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

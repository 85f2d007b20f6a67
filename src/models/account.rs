//! Account model
//!
//! An `Account` is a registered user: identity, login email, one-way secret
//! hash and role. The favorite set lives in its own table and is managed by
//! the favorites service.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque identifier (UUID v4), immutable
    pub id: String,
    /// Display name
    pub name: String,
    /// Login email, always stored lowercased
    pub email: String,
    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub role: AccountRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a freshly generated identifier.
    ///
    /// The secret must already be hashed, see `services::password::hash_secret()`.
    /// The email is normalized here so every persisted account honours the
    /// one-account-per-lowercase-email rule.
    pub fn new(name: String, email: &str, secret_hash: String, role: AccountRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            email: normalize_email(email),
            secret_hash,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == AccountRole::Admin
    }
}

/// An account together with the size of its favorite set
#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub account: Account,
    pub favorite_count: i64,
}

/// Account role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    /// Regular visitor with a favorites list
    #[default]
    User,
    /// Can list every account
    Admin,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::User => write!(f, "user"),
            AccountRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for AccountRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(AccountRole::User),
            "admin" => Ok(AccountRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid account role: {}", s)),
        }
    }
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Canonical form of an email used for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Simple `local@domain.tld` shape check
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Server-held session state.
///
/// The bearer token itself is never stored; the row is keyed by its digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// SHA-256 hex digest of the bearer token
    pub token_hash: String,
    pub account_id: String,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Digest under which a bearer token is stored and looked up
    pub fn digest(token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }
}

/// What a client receives after a successful login or registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProof {
    /// Opaque bearer token
    pub token: String,
    pub account_id: String,
    pub expires_at: DateTime<Utc>,
}

//! Secret hashing
//!
//! Account secrets are stored as Argon2id PHC strings with a random salt per
//! hash. Verification goes through `argon2`'s `PasswordVerifier`, whose final
//! digest comparison is constant-time.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;

/// Hash a secret using Argon2id with the crate's default parameters.
///
/// The returned PHC string embeds algorithm, parameters, salt and digest.
///
/// ```ignore
/// use wanderlist::services::password::hash_secret;
///
/// let hash = hash_secret("secret1")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))
        .context("Secret hashing failed")?;

    Ok(hash.to_string())
}

/// Verify a secret against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch and `Err` only when the stored hash is
/// unreadable.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid secret hash format: {}", e))
        .context("Failed to parse secret hash")?;

    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Secret verification failed: {}", e))
            .context("Secret verification error"),
    }
}

// Verified against when the email is unknown, so both login failures cost one Argon2 run.
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_secret("wanderlist-timing-equalizer").ok());

/// Burn the same work as a real verification and always report a mismatch.
pub fn verify_against_dummy(secret: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_secret(secret, hash);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_secret_produces_argon2id_hash() {
        let hash = hash_secret("secret1").expect("Failed to hash secret");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_hash_secret_is_salted() {
        let hash1 = hash_secret("same").expect("Failed to hash secret");
        let hash2 = hash_secret("same").expect("Failed to hash secret");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_secret() {
        let hash = hash_secret("secret1").expect("Failed to hash secret");

        assert!(verify_secret("secret1", &hash).unwrap());
        assert!(!verify_secret("secret2", &hash).unwrap());
        assert!(!verify_secret("SECRET1", &hash).unwrap());
    }

    #[test]
    fn test_verify_secret_invalid_hash() {
        assert!(verify_secret("secret1", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_hash_does_not_contain_secret() {
        let secret = "my_secret_value";
        let hash = hash_secret(secret).expect("Failed to hash secret");

        assert_ne!(secret, hash);
        assert!(!hash.contains(secret));
    }

    #[test]
    fn test_unicode_secret() {
        let secret = "pässwörd🔐";
        let hash = hash_secret(secret).unwrap();
        assert!(verify_secret(secret, &hash).unwrap());
    }

    #[test]
    fn test_dummy_verification_never_matches() {
        assert!(!verify_against_dummy("wanderlist-timing-equalizer"));
        assert!(!verify_against_dummy("anything"));
    }
}

//! Account service
//!
//! The credential store and authenticator:
//! - registration with input validation and email uniqueness
//! - login that fails identically for an unknown email and a wrong secret
//! - session issue, resolution, logout and expiry sweeping
//!
//! Session proofs are random UUIDv4 bearer tokens. Only their SHA-256 digest
//! is persisted, with an absolute expiry fixed at issuance.

use crate::config::{AdminSeed, AuthConfig, MAX_SESSION_TTL_HOURS};
use crate::db::is_unique_violation;
use crate::db::repositories::{AccountRepository, SessionRepository};
use crate::models::{
    is_valid_email, normalize_email, Account, AccountRole, AccountSummary, Session, SessionProof,
};
use crate::services::error::ErrorKind;
use crate::services::password::{hash_secret, verify_against_dummy, verify_secret};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
const DEFAULT_MIN_SECRET_LENGTH: usize = 6;

// Column widths of accounts.name and accounts.email
const MAX_NAME_LENGTH: usize = 100;
const MAX_EMAIL_LENGTH: usize = 255;

/// Error types for account service operations
#[derive(Debug, thiserror::Error)]
pub enum AccountServiceError {
    #[error("{0}")]
    ValidationError(String),

    /// Email already registered
    #[error("{0}")]
    ConflictError(String),

    /// Login rejected; the message never says which part was wrong
    #[error("Invalid email or secret")]
    AuthenticationError,

    /// Session proof missing, malformed, expired or unknown
    #[error("{0}")]
    UnauthenticatedError(String),

    #[error("Dependency failure: {0}")]
    DependencyError(#[from] anyhow::Error),
}

impl AccountServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountServiceError::ValidationError(_) => ErrorKind::ValidationError,
            AccountServiceError::ConflictError(_) => ErrorKind::ConflictError,
            AccountServiceError::AuthenticationError => ErrorKind::AuthenticationError,
            AccountServiceError::UnauthenticatedError(_) => ErrorKind::UnauthenticatedError,
            AccountServiceError::DependencyError(_) => ErrorKind::DependencyError,
        }
    }

    fn unauthenticated(message: &str) -> Self {
        AccountServiceError::UnauthenticatedError(message.to_string())
    }
}

/// Input for account registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub secret: String,
    pub role: AccountRole,
}

impl RegisterInput {
    /// Registration input for a regular user
    pub fn new(name: impl Into<String>, email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            secret: secret.into(),
            role: AccountRole::User,
        }
    }

    pub fn with_role(mut self, role: AccountRole) -> Self {
        self.role = role;
        self
    }
}

/// Input for login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub secret: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
        }
    }
}

/// An account together with a freshly issued session proof
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub account: Account,
    pub proof: SessionProof,
}

/// Account service for registration and authentication
pub struct AccountService {
    account_repo: Arc<dyn AccountRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_ttl: Duration,
    min_secret_length: usize,
}

impl AccountService {
    /// Create a new account service with default policy (24h sessions, 6-char secrets)
    pub fn new(
        account_repo: Arc<dyn AccountRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            account_repo,
            session_repo,
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            min_secret_length: DEFAULT_MIN_SECRET_LENGTH,
        }
    }

    /// Create an account service using the `auth` configuration section
    pub fn with_config(
        account_repo: Arc<dyn AccountRepository>,
        session_repo: Arc<dyn SessionRepository>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            account_repo,
            session_repo,
            session_ttl: Duration::hours(
                config.session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS),
            ),
            min_secret_length: config.min_secret_length,
        }
    }

    /// Override the session lifetime
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Register a new account.
    ///
    /// All validation happens before anything is written.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for an empty field, a malformed email, a short
    ///   secret, or a request to self-register as admin
    /// - `ConflictError` if the lowercased email already exists
    /// - `DependencyError` for database failures
    pub async fn register(&self, input: RegisterInput) -> Result<Account, AccountServiceError> {
        self.validate_register_input(&input)?;

        if input.role == AccountRole::Admin {
            return Err(AccountServiceError::ValidationError(
                "Only the 'user' role can be self-registered".to_string(),
            ));
        }

        self.create_account(input.name, &input.email, &input.secret, AccountRole::User)
            .await
    }

    /// Register and immediately start a session for the new account
    pub async fn register_and_login(
        &self,
        input: RegisterInput,
    ) -> Result<AuthSession, AccountServiceError> {
        let account = self.register(input).await?;
        let proof = self.start_session(&account.id).await?;
        Ok(AuthSession { account, proof })
    }

    /// Verify credentials and issue a new session proof.
    ///
    /// An unknown email and a wrong secret both yield `AuthenticationError`
    /// after one Argon2 verification.
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, AccountServiceError> {
        let email = normalize_email(&input.email);

        let account = self
            .account_repo
            .get_by_email(&email)
            .await
            .context("Failed to look up account")?;

        let account = match account {
            Some(account) => account,
            None => {
                verify_against_dummy(&input.secret);
                tracing::debug!("Login rejected: unknown email");
                return Err(AccountServiceError::AuthenticationError);
            }
        };

        let secret_ok = verify_secret(&input.secret, &account.secret_hash)
            .context("Failed to verify secret")?;
        if !secret_ok {
            tracing::debug!(account_id = %account.id, "Login rejected: secret mismatch");
            return Err(AccountServiceError::AuthenticationError);
        }

        let proof = self.start_session(&account.id).await?;
        tracing::info!(account_id = %account.id, "Account logged in");

        Ok(AuthSession { account, proof })
    }

    /// Mint and persist a session proof for an account
    pub async fn start_session(&self, account_id: &str) -> Result<SessionProof, AccountServiceError> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| anyhow::anyhow!("Session expiry is out of range"))?;
        let session = Session {
            token_hash: Session::digest(&token),
            account_id: account_id.to_string(),
            expires_at,
            created_at: now,
        };

        self.session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok(SessionProof {
            token,
            account_id: session.account_id,
            expires_at: session.expires_at,
        })
    }

    /// Resolve a bearer token to its account.
    ///
    /// An expired session is deleted when encountered.
    pub async fn resolve(&self, token: Option<&str>) -> Result<Account, AccountServiceError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AccountServiceError::unauthenticated("Missing session token"))?;

        if Uuid::parse_str(token).is_err() {
            return Err(AccountServiceError::unauthenticated("Malformed session token"));
        }

        let token_hash = Session::digest(token);
        let session = self
            .session_repo
            .get_by_hash(&token_hash)
            .await
            .context("Failed to get session")?
            .ok_or_else(|| AccountServiceError::unauthenticated("Invalid or expired session"))?;

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(&token_hash).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Err(AccountServiceError::unauthenticated("Invalid or expired session"));
        }

        self.account_repo
            .get_by_id(&session.account_id)
            .await
            .context("Failed to get account")?
            .ok_or_else(|| AccountServiceError::unauthenticated("Invalid or expired session"))
    }

    /// Invalidate a session. Unknown tokens are not an error.
    pub async fn logout(&self, token: &str) -> Result<(), AccountServiceError> {
        let removed = self
            .session_repo
            .delete(&Session::digest(token.trim()))
            .await
            .context("Failed to delete session")?;

        if removed {
            tracing::debug!("Session closed");
        }
        Ok(())
    }

    /// Every account with its favorite count
    pub async fn list_accounts(&self) -> Result<Vec<AccountSummary>, AccountServiceError> {
        let accounts = self
            .account_repo
            .list_with_favorite_counts()
            .await
            .context("Failed to list accounts")?;

        Ok(accounts)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AccountServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }

    /// Create the bootstrap admin if no account uses its email yet.
    ///
    /// Returns `true` when an account was created.
    pub async fn ensure_admin(&self, seed: &AdminSeed) -> Result<bool, AccountServiceError> {
        let input = RegisterInput::new(&seed.name, &seed.email, &seed.secret);
        self.validate_register_input(&input)?;

        let email = normalize_email(&seed.email);
        if let Some(existing) = self
            .account_repo
            .get_by_email(&email)
            .await
            .context("Failed to check admin email")?
        {
            if !existing.is_admin() {
                tracing::warn!(
                    "Bootstrap admin email {} belongs to a non-admin account; leaving it unchanged",
                    email
                );
            }
            return Ok(false);
        }

        match self
            .create_account(input.name, &input.email, &input.secret, AccountRole::Admin)
            .await
        {
            Ok(account) => {
                tracing::info!("Created bootstrap admin account {}", account.email);
                Ok(true)
            }
            // Another instance seeded it first
            Err(AccountServiceError::ConflictError(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    fn validate_register_input(&self, input: &RegisterInput) -> Result<(), AccountServiceError> {
        if input.name.trim().is_empty() {
            return Err(AccountServiceError::ValidationError(
                "Name cannot be empty".to_string(),
            ));
        }

        if input.name.trim().chars().count() > MAX_NAME_LENGTH {
            return Err(AccountServiceError::ValidationError(format!(
                "Name must be at most {} characters",
                MAX_NAME_LENGTH
            )));
        }

        if input.email.trim().is_empty() {
            return Err(AccountServiceError::ValidationError(
                "Email cannot be empty".to_string(),
            ));
        }

        if input.email.trim().chars().count() > MAX_EMAIL_LENGTH {
            return Err(AccountServiceError::ValidationError(format!(
                "Email must be at most {} characters",
                MAX_EMAIL_LENGTH
            )));
        }

        if !is_valid_email(&input.email) {
            return Err(AccountServiceError::ValidationError(
                "Invalid email format".to_string(),
            ));
        }

        if input.secret.is_empty() {
            return Err(AccountServiceError::ValidationError(
                "Secret cannot be empty".to_string(),
            ));
        }

        if input.secret.chars().count() < self.min_secret_length {
            return Err(AccountServiceError::ValidationError(format!(
                "Secret must be at least {} characters",
                self.min_secret_length
            )));
        }

        Ok(())
    }

    async fn create_account(
        &self,
        name: String,
        email: &str,
        secret: &str,
        role: AccountRole,
    ) -> Result<Account, AccountServiceError> {
        let email = normalize_email(email);
        let conflict = || {
            AccountServiceError::ConflictError(format!("Email '{}' is already registered", email))
        };

        if self
            .account_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(conflict());
        }

        let secret_hash = hash_secret(secret).context("Failed to hash secret")?;
        let account = Account::new(name, &email, secret_hash, role);

        // A concurrent registration can still win the race to the UNIQUE index
        match self.account_repo.create(&account).await {
            Ok(created) => {
                tracing::info!(account_id = %created.id, role = %created.role, "Account registered");
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => Err(conflict()),
            Err(e) => Err(AccountServiceError::DependencyError(
                e.context("Failed to create account"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxAccountRepository, SqlxSessionRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, AccountService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let account_repo = SqlxAccountRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let service = AccountService::new(account_repo, session_repo);

        (pool, service)
    }

    async fn account_count(pool: &DynDatabasePool) -> i64 {
        SqlxAccountRepository::new(pool.clone()).count().await.unwrap()
    }

    #[tokio::test]
    async fn test_register_creates_user_account() {
        let (_pool, service) = setup_test_service().await;

        let account = service
            .register(RegisterInput::new("Ann", "Ann@X.com", "secret1"))
            .await
            .expect("Registration should succeed");

        assert_eq!(account.name, "Ann");
        assert_eq!(account.email, "ann@x.com");
        assert_eq!(account.role, AccountRole::User);
        assert_ne!(account.secret_hash, "secret1");
        assert!(account.secret_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_same_email_twice_conflicts() {
        let (_pool, service) = setup_test_service().await;

        service
            .register(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();

        let err = service
            .register(RegisterInput::new("Ann Again", "ANN@x.com", "secret2"))
            .await
            .unwrap_err();

        assert!(matches!(err, AccountServiceError::ConflictError(_)));
        assert_eq!(err.kind(), ErrorKind::ConflictError);
    }

    #[tokio::test]
    async fn test_register_validation_happens_before_persistence() {
        let (pool, service) = setup_test_service().await;

        let cases = [
            RegisterInput::new("", "ann@x.com", "secret1"),
            RegisterInput::new("   ", "ann@x.com", "secret1"),
            RegisterInput::new("Ann", "", "secret1"),
            RegisterInput::new("Ann", "not-an-email", "secret1"),
            RegisterInput::new("Ann", "ann@x.com", ""),
            RegisterInput::new("Ann", "ann@x.com", "short"),
            RegisterInput::new("Ann", "ann@x.com", "secret1").with_role(AccountRole::Admin),
            RegisterInput::new("a".repeat(101), "ann@x.com", "secret1"),
            RegisterInput::new("Ann", format!("{}@x.com", "a".repeat(250)), "secret1"),
        ];

        for input in cases {
            let err = service.register(input.clone()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError, "input: {:?}", input);
        }

        assert_eq!(account_count(&pool).await, 0);

        let widest_email = format!("{}@x.com", "a".repeat(249));
        let widest = RegisterInput::new("a".repeat(100), widest_email, "secret1");
        service.register(widest).await.expect("Names and emails at the column width fit");
        assert_eq!(account_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_expiry_is_an_error_not_a_panic() {
        let (_pool, service) = setup_test_service().await;
        let account = service
            .register(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();

        let service = service.with_session_ttl(Duration::days(100_000_000));
        let err = service.start_session(&account.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyError);
    }

    #[tokio::test]
    async fn test_oversized_configured_ttl_is_capped() {
        let (pool, _) = setup_test_service().await;
        let config = AuthConfig {
            session_ttl_hours: i64::MAX,
            ..AuthConfig::default()
        };
        let service = AccountService::with_config(
            SqlxAccountRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            &config,
        );

        let auth = service
            .register_and_login(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();
        let ttl = auth.proof.expires_at - Utc::now();
        assert!(ttl <= Duration::hours(MAX_SESSION_TTL_HOURS));
        assert!(ttl > Duration::hours(MAX_SESSION_TTL_HOURS - 1));
    }

    #[tokio::test]
    async fn test_login_success_issues_session() {
        let (_pool, service) = setup_test_service().await;
        let account = service
            .register(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();

        let session = service
            .login(LoginInput::new("ANN@x.com", "secret1"))
            .await
            .expect("Login should succeed");

        assert_eq!(session.account.id, account.id);
        assert_eq!(session.proof.account_id, account.id);
        assert!(Uuid::parse_str(&session.proof.token).is_ok());

        let ttl = session.proof.expires_at - Utc::now();
        assert!(ttl > Duration::hours(23) && ttl <= Duration::hours(24));
    }

    #[tokio::test]
    async fn test_wrong_secret_and_unknown_email_fail_identically() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();

        let wrong_secret = service
            .login(LoginInput::new("ann@x.com", "wrong!"))
            .await
            .unwrap_err();
        let unknown_email = service
            .login(LoginInput::new("nobody@x.com", "secret1"))
            .await
            .unwrap_err();

        assert_eq!(wrong_secret.kind(), ErrorKind::AuthenticationError);
        assert_eq!(unknown_email.kind(), ErrorKind::AuthenticationError);
        assert_eq!(wrong_secret.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_resolve_valid_session() {
        let (_pool, service) = setup_test_service().await;
        let auth = service
            .register_and_login(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();

        let account = service.resolve(Some(&auth.proof.token)).await.unwrap();
        assert_eq!(account.id, auth.account.id);
    }

    #[tokio::test]
    async fn test_resolve_rejects_missing_malformed_and_unknown() {
        let (_pool, service) = setup_test_service().await;

        for token in [None, Some(""), Some("not-a-uuid"), Some("3f2b8c1e-0000-4000-8000-000000000000")] {
            let err = service.resolve(token).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnauthenticatedError, "token: {:?}", token);
        }
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_deleted() {
        let (pool, service) = setup_test_service().await;
        let service = service.with_session_ttl(Duration::seconds(-1));

        let auth = service
            .register_and_login(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();

        let err = service.resolve(Some(&auth.proof.token)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthenticatedError);

        let remaining = SqlxSessionRepository::new(pool.clone())
            .get_by_hash(&Session::digest(&auth.proof.token))
            .await
            .unwrap();
        assert!(remaining.is_none());
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_pool, service) = setup_test_service().await;
        let auth = service
            .register_and_login(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();

        service.logout(&auth.proof.token).await.unwrap();
        assert!(service.resolve(Some(&auth.proof.token)).await.is_err());

        // Second logout is a no-op
        service.logout(&auth.proof.token).await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (_pool, service) = setup_test_service().await;
        let expiring = service.with_session_ttl(Duration::seconds(-1));

        expiring
            .register_and_login(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .unwrap();
        expiring.login(LoginInput::new("ann@x.com", "secret1")).await.unwrap();

        assert_eq!(expiring.cleanup_expired_sessions().await.unwrap(), 2);
        assert_eq!(expiring.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let (pool, service) = setup_test_service().await;
        let seed = AdminSeed {
            name: "Root".to_string(),
            email: "Root@X.com".to_string(),
            secret: "rootsecret".to_string(),
        };

        assert!(service.ensure_admin(&seed).await.unwrap());
        assert!(!service.ensure_admin(&seed).await.unwrap());
        assert_eq!(account_count(&pool).await, 1);

        let admin = service
            .login(LoginInput::new("root@x.com", "rootsecret"))
            .await
            .unwrap()
            .account;
        assert!(admin.is_admin());
    }

    #[tokio::test]
    async fn test_list_accounts() {
        let (_pool, service) = setup_test_service().await;
        service.register(RegisterInput::new("Ann", "ann@x.com", "secret1")).await.unwrap();
        service.register(RegisterInput::new("Bob", "bob@x.com", "secret2")).await.unwrap();

        let accounts = service.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|s| s.favorite_count == 0));
    }
}

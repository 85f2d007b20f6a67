//! Favorites service
//!
//! Maintains each account's set of favorite country codes. Codes are
//! normalized to upper case, so `lka` and `LKA` are the same member.
//!
//! The `*_favorite` operations take a bearer token and resolve it through
//! the account service first; the account-id variants are for callers that
//! have already resolved identity (the HTTP auth layer).

use crate::db::repositories::FavoriteRepository;
use crate::models::CountryCode;
use crate::services::account::{AccountService, AccountServiceError};
use crate::services::error::ErrorKind;
use anyhow::Context;
use std::sync::Arc;

/// Error types for favorites operations
#[derive(Debug, thiserror::Error)]
pub enum FavoritesServiceError {
    /// Country code failed the format check
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    UnauthenticatedError(String),

    #[error("Dependency failure: {0}")]
    DependencyError(#[from] anyhow::Error),
}

impl FavoritesServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FavoritesServiceError::ValidationError(_) => ErrorKind::ValidationError,
            FavoritesServiceError::UnauthenticatedError(_) => ErrorKind::UnauthenticatedError,
            FavoritesServiceError::DependencyError(_) => ErrorKind::DependencyError,
        }
    }
}

impl From<AccountServiceError> for FavoritesServiceError {
    fn from(err: AccountServiceError) -> Self {
        match err {
            AccountServiceError::DependencyError(e) => FavoritesServiceError::DependencyError(e),
            AccountServiceError::ValidationError(msg) => FavoritesServiceError::ValidationError(msg),
            other => FavoritesServiceError::UnauthenticatedError(other.to_string()),
        }
    }
}

pub struct FavoritesService {
    favorite_repo: Arc<dyn FavoriteRepository>,
    account_service: Arc<AccountService>,
}

impl FavoritesService {
    pub fn new(
        favorite_repo: Arc<dyn FavoriteRepository>,
        account_service: Arc<AccountService>,
    ) -> Self {
        Self {
            favorite_repo,
            account_service,
        }
    }

    /// Add a country to the caller's favorites. Adding a present code succeeds unchanged.
    pub async fn add_favorite(
        &self,
        token: Option<&str>,
        raw_code: &str,
    ) -> Result<(), FavoritesServiceError> {
        let account = self.account_service.resolve(token).await?;
        self.add(&account.id, raw_code).await.map(|_| ())
    }

    /// Remove a country from the caller's favorites. Removing an absent code succeeds.
    pub async fn remove_favorite(
        &self,
        token: Option<&str>,
        raw_code: &str,
    ) -> Result<(), FavoritesServiceError> {
        let account = self.account_service.resolve(token).await?;
        self.remove(&account.id, raw_code).await.map(|_| ())
    }

    /// The caller's current favorite set
    pub async fn list_favorites(
        &self,
        token: Option<&str>,
    ) -> Result<Vec<CountryCode>, FavoritesServiceError> {
        let account = self.account_service.resolve(token).await?;
        self.list(&account.id).await
    }

    /// Add for an already resolved account. Returns whether the set changed.
    pub async fn add(&self, account_id: &str, raw_code: &str) -> Result<bool, FavoritesServiceError> {
        let code = parse_code(raw_code)?;

        let inserted = self
            .favorite_repo
            .add(account_id, &code)
            .await
            .context("Failed to add favorite")?;

        if inserted {
            tracing::debug!(account_id, code = %code, "Favorite added");
        }
        Ok(inserted)
    }

    /// Remove for an already resolved account. Returns whether the set changed.
    pub async fn remove(
        &self,
        account_id: &str,
        raw_code: &str,
    ) -> Result<bool, FavoritesServiceError> {
        let code = parse_code(raw_code)?;

        let removed = self
            .favorite_repo
            .remove(account_id, &code)
            .await
            .context("Failed to remove favorite")?;

        if removed {
            tracing::debug!(account_id, code = %code, "Favorite removed");
        }
        Ok(removed)
    }

    /// List for an already resolved account
    pub async fn list(&self, account_id: &str) -> Result<Vec<CountryCode>, FavoritesServiceError> {
        let codes = self
            .favorite_repo
            .list(account_id)
            .await
            .context("Failed to list favorites")?;

        Ok(codes)
    }
}

fn parse_code(raw: &str) -> Result<CountryCode, FavoritesServiceError> {
    CountryCode::parse(raw).map_err(|e| FavoritesServiceError::ValidationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAccountRepository, SqlxFavoriteRepository, SqlxSessionRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::services::account::RegisterInput;
    use std::collections::HashSet;

    async fn setup() -> (FavoritesService, Arc<AccountService>, String) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let account_service = Arc::new(AccountService::new(
            SqlxAccountRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        ));
        let service = FavoritesService::new(
            SqlxFavoriteRepository::boxed(pool.clone()),
            account_service.clone(),
        );

        let token = account_service
            .register_and_login(RegisterInput::new("Ann", "ann@x.com", "secret1"))
            .await
            .expect("Failed to register")
            .proof
            .token;

        (service, account_service, token)
    }

    fn as_set(codes: Vec<CountryCode>) -> HashSet<String> {
        codes.into_iter().map(String::from).collect()
    }

    #[tokio::test]
    async fn test_add_twice_equals_add_once() {
        let (service, _, token) = setup().await;

        service.add_favorite(Some(&token), "LKA").await.unwrap();
        service.add_favorite(Some(&token), "LKA").await.unwrap();

        let favorites = service.list_favorites(Some(&token)).await.unwrap();
        assert_eq!(as_set(favorites), HashSet::from(["LKA".to_string()]));
    }

    #[tokio::test]
    async fn test_list_is_exact_set_regardless_of_order() {
        let (service, _, token) = setup().await;

        service.add_favorite(Some(&token), "FRA").await.unwrap();
        service.add_favorite(Some(&token), "lka").await.unwrap();

        let favorites = service.list_favorites(Some(&token)).await.unwrap();
        assert_eq!(
            as_set(favorites),
            HashSet::from(["FRA".to_string(), "LKA".to_string()])
        );
    }

    #[tokio::test]
    async fn test_remove_favorite() {
        let (service, _, token) = setup().await;

        service.add_favorite(Some(&token), "LKA").await.unwrap();
        service.remove_favorite(Some(&token), "lka").await.unwrap();
        service.remove_favorite(Some(&token), "LKA").await.unwrap();

        assert!(service.list_favorites(Some(&token)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_code_is_validation_error() {
        let (service, _, token) = setup().await;

        for raw in ["", "LK", "LKAA", "L1A"] {
            let err = service.add_favorite(Some(&token), raw).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError, "code: {:?}", raw);
        }
        assert!(service.list_favorites(Some(&token)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identity_failure_is_distinct_from_validation() {
        let (service, _, _token) = setup().await;

        // Identity is resolved before the code is looked at
        let err = service.add_favorite(None, "not a code").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthenticatedError);

        let err = service.list_favorites(Some("garbage")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthenticatedError);
    }

    #[tokio::test]
    async fn test_logout_revokes_favorites_access() {
        let (service, account_service, token) = setup().await;

        account_service.logout(&token).await.unwrap();
        let err = service.list_favorites(Some(&token)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthenticatedError);
    }
}

//! Favorites API endpoints
//!
//! - GET /api/users/favorites - Current favorite set
//! - POST /api/users/favorites - Add a country code
//! - DELETE /api/users/favorites/{country_code} - Remove a country code
//!
//! Every route expects `require_auth` to have resolved the caller.

use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedAccount, ValidatedJson};
use crate::models::CountryCode;

/// Request body for adding a favorite
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddFavoriteRequest {
    #[serde(alias = "cca3")]
    pub country_code: String,
}

#[derive(Debug, Serialize)]
pub struct FavoritesResponse {
    pub favorites: Vec<CountryCode>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/favorites", get(list_favorites).post(add_favorite))
        .route("/favorites/{country_code}", delete(remove_favorite))
}

async fn current_set(state: &AppState, account_id: &str) -> Result<Json<FavoritesResponse>, ApiError> {
    let favorites = state.favorites_service.list(account_id).await?;
    Ok(Json(FavoritesResponse { favorites }))
}

/// GET /api/users/favorites
async fn list_favorites(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
) -> Result<Json<FavoritesResponse>, ApiError> {
    current_set(&state, &account.id).await
}

/// POST /api/users/favorites
///
/// Adding a code that is already present returns the same 200 response.
async fn add_favorite(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    ValidatedJson(body): ValidatedJson<AddFavoriteRequest>,
) -> Result<Json<FavoritesResponse>, ApiError> {
    state
        .favorites_service
        .add(&account.id, &body.country_code)
        .await?;
    current_set(&state, &account.id).await
}

/// DELETE /api/users/favorites/{country_code}
async fn remove_favorite(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    Path(country_code): Path<String>,
) -> Result<Json<FavoritesResponse>, ApiError> {
    state
        .favorites_service
        .remove(&account.id, &country_code)
        .await?;
    current_set(&state, &account.id).await
}

//! Admin API endpoints
//!
//! - GET /api/users/admin/accounts - Every account with its favorite count

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::auth::AccountResponse;
use crate::api::middleware::{ApiError, AppState, AuthenticatedAccount};
use crate::models::AccountSummary;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountListEntry {
    #[serde(flatten)]
    pub account: AccountResponse,
    pub favorite_count: i64,
}

impl From<AccountSummary> for AccountListEntry {
    fn from(summary: AccountSummary) -> Self {
        Self {
            account: summary.account.into(),
            favorite_count: summary.favorite_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountListResponse {
    pub accounts: Vec<AccountListEntry>,
    pub total: usize,
}

/// Admin routes (wrap with `require_admin` inside `require_auth`)
pub fn router() -> Router<AppState> {
    Router::new().route("/accounts", get(list_accounts))
}

/// GET /api/users/admin/accounts
async fn list_accounts(
    State(state): State<AppState>,
    AuthenticatedAccount(admin): AuthenticatedAccount,
) -> Result<Json<AccountListResponse>, ApiError> {
    let accounts: Vec<AccountListEntry> = state
        .account_service
        .list_accounts()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    tracing::debug!(admin_id = %admin.id, count = accounts.len(), "Listed accounts");

    Ok(Json(AccountListResponse {
        total: accounts.len(),
        accounts,
    }))
}

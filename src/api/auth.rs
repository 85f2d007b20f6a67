//! Authentication API endpoints
//!
//! - POST /api/users/register - Create an account and log in
//! - POST /api/users/login - Exchange credentials for a bearer token
//! - POST /api/users/logout - Invalidate the presented token
//! - GET /api/users/me - Current account

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    extract_bearer_token, ApiError, AppState, AuthenticatedAccount, ClientIp, ValidatedJson,
};
use crate::models::{Account, AccountRole};
use crate::services::{AccountServiceError, AuthSession, LoginInput, RegisterInput};

/// Request body for registration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(alias = "password")]
    pub secret: String,
    #[serde(default)]
    pub role: Option<AccountRole>,
}

/// Request body for login
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    #[serde(alias = "password")]
    pub secret: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountResponse,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            token: session.proof.token,
            expires_at: session.proof.expires_at,
            account: session.account.into(),
        }
    }
}

/// Public view of an account; never includes the secret hash
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: AccountRole,
    pub created_at: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            email: account.email,
            role: account.role,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Routes that issue tokens
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes that need a resolved account (wrap with `require_auth`)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
}

async fn check_ip_limit(state: &AppState, ip: ClientIp) -> Result<(), ApiError> {
    if let ClientIp(Some(ip)) = ip {
        if let Some(retry_after) = state.rate_limiter.check_ip(ip).await {
            tracing::warn!(%ip, "IP rate limit exceeded on auth endpoint");
            return Err(ApiError::rate_limited(
                "Too many requests, please try again later",
                retry_after,
            ));
        }
    }
    Ok(())
}

/// POST /api/users/register
async fn register(
    State(state): State<AppState>,
    ip: ClientIp,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_ip_limit(&state, ip).await?;

    let input = RegisterInput::new(body.name, body.email, body.secret)
        .with_role(body.role.unwrap_or_default());

    let session = state.account_service.register_and_login(input).await?;

    Ok((StatusCode::CREATED, Json(AuthResponse::from(session))))
}

/// POST /api/users/login
///
/// Throttling runs before any credential check and answers the same way
/// whether or not the email exists.
async fn login(
    State(state): State<AppState>,
    ip: ClientIp,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_ip_limit(&state, ip).await?;

    if let Some(retry_after) = state.rate_limiter.check_email(&body.email).await {
        return Err(ApiError::rate_limited(
            "Too many failed login attempts, please try again later",
            retry_after,
        ));
    }

    match state
        .account_service
        .login(LoginInput::new(body.email.clone(), body.secret))
        .await
    {
        Ok(session) => {
            state.rate_limiter.clear_email_attempts(&body.email).await;
            Ok(Json(AuthResponse::from(session)))
        }
        Err(e) => {
            if matches!(e, AccountServiceError::AuthenticationError) {
                state.rate_limiter.record_failed_attempt(&body.email).await;
            }
            Err(e.into())
        }
    }
}

/// POST /api/users/logout
async fn logout(
    State(state): State<AppState>,
    AuthenticatedAccount(account): AuthenticatedAccount,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_bearer_token(&headers) {
        state.account_service.logout(token).await?;
    }
    tracing::debug!(account_id = %account.id, "Logged out");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/users/me
async fn me(AuthenticatedAccount(account): AuthenticatedAccount) -> Json<AccountResponse> {
    Json(account.into())
}

//! API middleware
//!
//! Contains:
//! - `AppState`, the injected process-wide services
//! - the error envelope (`ApiError`) and its status mapping
//! - bearer authentication (`require_auth`) and admin authorization (`require_admin`)
//! - `ValidatedJson`, a strict JSON body extractor
//! - `ClientIp`, the best-effort client address used for throttling

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::repositories::{SqlxAccountRepository, SqlxFavoriteRepository, SqlxSessionRepository};
use crate::db::DynDatabasePool;
use crate::models::Account;
use crate::services::{
    AccountService, AccountServiceError, ErrorKind, FavoritesService, FavoritesServiceError,
    LoginRateLimiter,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub account_service: Arc<AccountService>,
    pub favorites_service: Arc<FavoritesService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    /// Take the client address from `X-Forwarded-For`/`X-Real-IP`.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_forwarded_headers: bool,
}

impl AppState {
    /// Wire repositories and services on top of a migrated pool
    pub fn new(pool: DynDatabasePool, auth: &AuthConfig) -> Self {
        let account_service = Arc::new(AccountService::with_config(
            SqlxAccountRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            auth,
        ));
        let favorites_service = Arc::new(FavoritesService::new(
            SqlxFavoriteRepository::boxed(pool.clone()),
            account_service.clone(),
        ));

        Self {
            pool,
            account_service,
            favorites_service,
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            trust_forwarded_headers: false,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<LoginRateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

/// Account resolved from the bearer token by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount(pub Account);

// ============================================================================
// Error envelope
// ============================================================================

/// Error response for API errors: `{"error": {"code", "message", "details"?}}`
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: kind,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        kind: ErrorKind,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: kind,
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnauthenticatedError, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ForbiddenError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFoundError, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: i64) -> Self {
        Self::with_details(
            ErrorKind::RateLimitError,
            message,
            serde_json::json!({ "retry_after": retry_after }),
        )
    }

    /// The cause is logged, never sent to the client
    pub fn dependency(err: anyhow::Error) -> Self {
        tracing::error!("Dependency failure: {:#}", err);
        Self::new(ErrorKind::DependencyError, "Service temporarily unavailable")
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.code
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::ConflictError => StatusCode::CONFLICT,
            ErrorKind::AuthenticationError | ErrorKind::UnauthenticatedError => {
                StatusCode::UNAUTHORIZED
            }
            ErrorKind::ForbiddenError => StatusCode::FORBIDDEN,
            ErrorKind::RateLimitError => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::DependencyError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFoundError => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AccountServiceError> for ApiError {
    fn from(err: AccountServiceError) -> Self {
        match err {
            AccountServiceError::DependencyError(e) => ApiError::dependency(e),
            other => ApiError::new(other.kind(), other.to_string()),
        }
    }
}

impl From<FavoritesServiceError> for ApiError {
    fn from(err: FavoritesServiceError) -> Self {
        match err {
            FavoritesServiceError::DependencyError(e) => ApiError::dependency(e),
            other => ApiError::new(other.kind(), other.to_string()),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Token from an `Authorization: Bearer <token>` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers()).map(str::to_owned);

    let account = state.account_service.resolve(token.as_deref()).await?;

    request.extensions_mut().insert(AuthenticatedAccount(account));
    Ok(next.run(request).await)
}

/// Admin authorization middleware, layered inside `require_auth`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let account = request
        .extensions()
        .get::<AuthenticatedAccount>()
        .ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;

    if !account.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedAccount
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAccount>()
            .cloned()
            .ok_or_else(|| ApiError::unauthenticated("Authentication required"))
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// JSON body extractor whose rejections are `VALIDATION_ERROR`s.
///
/// Combined with `#[serde(deny_unknown_fields)]` on the body type, unknown,
/// missing and mistyped fields are all rejected at the boundary.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::validation_error(rejection.body_text())),
        }
    }
}

/// Client address used for throttling.
///
/// The peer address, unless `AppState::trust_forwarded_headers` is set, in
/// which case the first `X-Forwarded-For` hop or `X-Real-IP` wins.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(ClientIp(resolve_client_ip(
            &parts.headers,
            peer,
            state.trust_forwarded_headers,
        )))
    }
}

fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_forwarded: bool,
) -> Option<IpAddr> {
    if trust_forwarded {
        client_ip_from_headers(headers).or(peer)
    } else {
        peer
    }
}

fn client_ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|s| s.trim().parse().ok()) {
            return Some(ip);
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc-123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc-123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  abc-123 "));
        assert_eq!(extract_bearer_token(&headers), Some("abc-123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ErrorKind::ValidationError, StatusCode::BAD_REQUEST),
            (ErrorKind::ConflictError, StatusCode::CONFLICT),
            (ErrorKind::AuthenticationError, StatusCode::UNAUTHORIZED),
            (ErrorKind::UnauthenticatedError, StatusCode::UNAUTHORIZED),
            (ErrorKind::ForbiddenError, StatusCode::FORBIDDEN),
            (ErrorKind::RateLimitError, StatusCode::TOO_MANY_REQUESTS),
            (ErrorKind::DependencyError, StatusCode::SERVICE_UNAVAILABLE),
            (ErrorKind::NotFoundError, StatusCode::NOT_FOUND),
        ];

        for (kind, status) in cases {
            assert_eq!(ApiError::new(kind, "x").status(), status);
        }
    }

    #[test]
    fn test_error_envelope_shape() {
        let json = serde_json::to_value(ApiError::rate_limited("Slow down", 42)).unwrap();

        assert_eq!(json["error"]["code"], "RATE_LIMIT_ERROR");
        assert_eq!(json["error"]["message"], "Slow down");
        assert_eq!(json["error"]["details"]["retry_after"], 42);

        let json = serde_json::to_value(ApiError::not_found("nope")).unwrap();
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn test_dependency_error_hides_cause() {
        let err = ApiError::dependency(anyhow::anyhow!("disk I/O error at /var/lib/db"));
        assert_eq!(err.kind(), ErrorKind::DependencyError);
        assert!(!err.error.message.contains("disk"));
    }

    #[test]
    fn test_client_ip_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip_from_headers(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip_from_headers(&headers), "10.0.0.2".parse().ok());

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip_from_headers(&headers), "203.0.113.7".parse().ok());
    }

    #[test]
    fn test_forwarded_headers_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let peer: Option<IpAddr> = "192.0.2.1".parse().ok();

        assert_eq!(resolve_client_ip(&headers, peer, false), peer);
        assert_eq!(resolve_client_ip(&headers, None, false), None);
        assert_eq!(
            resolve_client_ip(&headers, peer, true),
            "203.0.113.7".parse().ok()
        );
        assert_eq!(resolve_client_ip(&HeaderMap::new(), peer, true), peer);
    }
}

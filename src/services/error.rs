//! Stable error kinds shared by every service
//!
//! Service errors carry a human-readable message; the kind is what callers
//! branch on and what the HTTP layer reports as `error.code`.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    ValidationError,
    /// Uniqueness violated (email already registered)
    ConflictError,
    /// Login credentials rejected
    AuthenticationError,
    /// Missing, malformed, expired or unknown session proof
    UnauthenticatedError,
    /// Authenticated but lacking the required role
    ForbiddenError,
    /// Too many attempts
    RateLimitError,
    /// Persistence or other collaborator failure
    DependencyError,
    NotFoundError,
}

impl ErrorKind {
    /// Wire code, e.g. `VALIDATION_ERROR`
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::ConflictError => "CONFLICT_ERROR",
            ErrorKind::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorKind::UnauthenticatedError => "UNAUTHENTICATED_ERROR",
            ErrorKind::ForbiddenError => "FORBIDDEN_ERROR",
            ErrorKind::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorKind::DependencyError => "DEPENDENCY_ERROR",
            ErrorKind::NotFoundError => "NOT_FOUND_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_matches_serde_name() {
        for kind in [
            ErrorKind::ValidationError,
            ErrorKind::ConflictError,
            ErrorKind::AuthenticationError,
            ErrorKind::UnauthenticatedError,
            ErrorKind::ForbiddenError,
            ErrorKind::RateLimitError,
            ErrorKind::DependencyError,
            ErrorKind::NotFoundError,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.code());
        }
    }
}

//! Services layer - Business logic
//!
//! Services own the business rules and validation, and translate repository
//! failures into typed errors with a stable `ErrorKind`.

pub mod account;
pub mod error;
pub mod favorites;
pub mod password;
pub mod rate_limiter;

pub use account::{AccountService, AccountServiceError, AuthSession, LoginInput, RegisterInput};
pub use error::ErrorKind;
pub use favorites::{FavoritesService, FavoritesServiceError};
pub use password::{hash_secret, verify_secret};
pub use rate_limiter::{LoginRateLimiter, RateLimitPolicy};

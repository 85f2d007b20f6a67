//! Database repositories
//!
//! One repository per table: accounts, sessions and favorites.
//! Implementations dispatch on the pool's driver.

pub mod account;
pub mod favorite;
pub mod session;

pub use account::{AccountRepository, SqlxAccountRepository};
pub use favorite::{FavoriteRepository, SqlxFavoriteRepository};
pub use session::{SessionRepository, SqlxSessionRepository};

//! Data models
//!
//! Entities persisted by the service and the value types validated at its
//! boundary:
//! - `Account` and its `AccountRole`
//! - `Session` (server-held session state) and `SessionProof` (what the client holds)
//! - `CountryCode` (a validated cca3 code)

mod account;
mod country;
mod session;

pub use account::{is_valid_email, normalize_email, Account, AccountRole, AccountSummary};
pub use country::{CountryCode, CountryCodeError};
pub use session::{Session, SessionProof};

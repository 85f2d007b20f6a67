//! Country code value type
//!
//! Codes are the catalog's `cca3` identifiers. Only the format is checked;
//! whether a code names a real country is the catalog's concern.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated, upper-case, three-letter country code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

/// Why a string was rejected as a country code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CountryCodeError {
    #[error("Country code cannot be empty")]
    Empty,
    #[error("Country code must be exactly 3 letters, got '{0}'")]
    InvalidFormat(String),
}

impl CountryCode {
    /// Trim, upper-case and validate a raw code.
    pub fn parse(raw: &str) -> Result<Self, CountryCodeError> {
        let code = raw.trim();
        if code.is_empty() {
            return Err(CountryCodeError::Empty);
        }
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CountryCodeError::InvalidFormat(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CountryCode {
    type Err = CountryCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CountryCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CountryCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn any_three_ascii_letters_parse_to_uppercase(raw in "[a-zA-Z]{3}") {
            let code = CountryCode::parse(&raw).unwrap();
            prop_assert_eq!(code.as_str(), raw.to_ascii_uppercase());
        }

        #[test]
        fn parsing_is_idempotent(raw in "[a-zA-Z]{3}") {
            let once = CountryCode::parse(&raw).unwrap();
            let twice = CountryCode::parse(once.as_str()).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn wrong_length_never_parses(raw in "[a-zA-Z]{4,8}|[a-zA-Z]{1,2}") {
            prop_assert!(CountryCode::parse(&raw).is_err());
        }
    }
}

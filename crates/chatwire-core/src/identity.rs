//! User identifiers.
//!
//! Backends disagree on whether ids are strings or integers, so a [`UserId`]
//! accepts either form on the wire and always serializes as a string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a chat participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawUserId", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a user id from anything string-like.
    ///
    /// Empty ids are accepted here; use [`str::parse`] when the input is untrusted.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = UserIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(UserIdParseError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Wire form of a user id before validation.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Number(u64),
    Text(String),
}

impl TryFrom<RawUserId> for UserId {
    type Error = UserIdParseError;

    fn try_from(raw: RawUserId) -> Result<Self, Self::Error> {
        match raw {
            RawUserId::Number(n) => Ok(n.into()),
            RawUserId::Text(s) => s.parse(),
        }
    }
}

/// Error parsing a user id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserIdParseError {
    #[error("user id cannot be empty")]
    Empty,
}

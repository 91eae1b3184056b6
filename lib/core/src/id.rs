//! Strongly-typed identifiers.
//!
//! IDs use ULID format so they sort by creation time, and render with a
//! short type prefix (`usr_01H...`) so they are recognizable in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const USER_PREFIX: &str = "usr_";

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Internal identifier the user directory assigns to a user record.
///
/// Serializes as the bare ULID; displays and parses with the `usr_` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Ulid);

impl UserId {
    /// Creates a new ID with a randomly generated ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{USER_PREFIX}{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    /// Accepts both `usr_<ulid>` and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid_str = s.strip_prefix(USER_PREFIX).unwrap_or(s);
        Ulid::from_str(ulid_str)
            .map(Self)
            .map_err(|e| ParseIdError {
                id_type: "UserId",
                reason: e.to_string(),
            })
    }
}

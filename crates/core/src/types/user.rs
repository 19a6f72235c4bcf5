//! Authenticated user identifier.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::key::GUEST_TOKEN;

/// Errors that can occur when parsing a [`UserId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UserIdError {
    /// The input string is empty or only whitespace.
    #[error("user id cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("user id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input is a token reserved for guests or coerced absent values.
    #[error("user id `{0}` is reserved")]
    Reserved(String),
    /// The input contains whitespace or control characters.
    #[error("user id must not contain whitespace or control characters")]
    InvalidCharacter,
}

/// Tokens that upstream code produces when an identity is missing.
const RESERVED: &[&str] = &[GUEST_TOKEN, "undefined", "null", "none", "nil"];

/// The authenticated user's identifier, as supplied by the session layer.
///
/// ## Constraints
///
/// - Length: 1-128 characters
/// - Not one of the reserved tokens (`guest`, `undefined`, `null`, `none`, `nil`),
///   compared case-insensitively
/// - Does not start with `guest_` (the guest scope prefix)
/// - No whitespace or control characters
///
/// These rules make a user-scoped storage key impossible to confuse with a
/// guest-scoped key or with an identity that was silently stringified.
///
/// ## Examples
///
/// ```
/// use larder_core::UserId;
///
/// assert!(UserId::parse("user-42").is_ok());
///
/// assert!(UserId::parse("").is_err());
/// assert!(UserId::parse("undefined").is_err());
/// assert!(UserId::parse("guest_1234").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Maximum length of a user ID.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a `UserId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, too long, reserved, or
    /// contains whitespace/control characters.
    pub fn parse(s: &str) -> Result<Self, UserIdError> {
        if s.trim().is_empty() {
            return Err(UserIdError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(UserIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(UserIdError::InvalidCharacter);
        }

        let lower = s.to_ascii_lowercase();
        if RESERVED.contains(&lower.as_str()) || lower.starts_with("guest_") {
            return Err(UserIdError::Reserved(s.to_owned()));
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the user ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `UserId` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

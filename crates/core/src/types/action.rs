//! Action key type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`ActionKey`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionKeyError {
    /// The input string is empty.
    #[error("action key cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("action key must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains a character outside `[a-z0-9_.-]`.
    #[error("action key contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Identifier of a credit-costing action (e.g. `export_report`).
///
/// ## Constraints
///
/// - Length: 1-64 characters
/// - Lowercase ASCII letters, digits, `_`, `.` and `-` only
///
/// ## Examples
///
/// ```
/// use tillwise_core::ActionKey;
///
/// assert!(ActionKey::parse("export_report").is_ok());
/// assert!(ActionKey::parse("pos.sale").is_ok());
///
/// assert!(ActionKey::parse("").is_err());
/// assert!(ActionKey::parse("Export Report").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ActionKey(String);

impl ActionKey {
    /// Maximum length of an action key.
    pub const MAX_LENGTH: usize = 64;

    /// Parse an `ActionKey` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, longer than 64 characters, or
    /// contains characters other than lowercase ASCII letters, digits, `_`,
    /// `.` and `-`.
    pub fn parse(s: &str) -> Result<Self, ActionKeyError> {
        if s.is_empty() {
            return Err(ActionKeyError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(ActionKeyError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-')))
        {
            return Err(ActionKeyError::InvalidCharacter(bad));
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ActionKey {
    type Err = ActionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ActionKey {
    type Error = ActionKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ActionKey> for String {
    fn from(key: ActionKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ActionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_keys() {
        assert!(ActionKey::parse("export_report").is_ok());
        assert!(ActionKey::parse("storefront.create").is_ok());
        assert!(ActionKey::parse("pos-sale-2").is_ok());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ActionKey::parse(""), Err(ActionKeyError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(65);
        assert!(matches!(
            ActionKey::parse(&long),
            Err(ActionKeyError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_uppercase_rejected() {
        assert_eq!(
            ActionKey::parse("Export"),
            Err(ActionKeyError::InvalidCharacter('E'))
        );
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<ActionKey>("\"export_report\"").is_ok());
        assert!(serde_json::from_str::<ActionKey>("\"bad key\"").is_err());
    }
}

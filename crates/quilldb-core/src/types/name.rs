//! Validated object names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A validated name for a database, collection, or view.
///
/// Names must be non-empty and contain only alphanumeric characters,
/// underscores, and hyphens. This keeps them safe to echo into error
/// messages and log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectName(String);

impl ObjectName {
    /// Create a new validated name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, too long, or contains invalid
    /// characters.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();

        if name.is_empty() {
            return Err(NameError::Empty);
        }

        if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(NameError::InvalidCharacters(name));
        }

        if name.len() > 255 {
            return Err(NameError::TooLong(name.len()));
        }

        Ok(Self(name))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the underlying string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when validating an object name.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NameError {
    #[error("name cannot be empty")]
    Empty,

    #[error("name '{0}' contains invalid characters (allowed: alphanumeric, underscore, hyphen)")]
    InvalidCharacters(String),

    #[error("name too long: {0} bytes (maximum: 255)")]
    TooLong(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert_eq!(ObjectName::new("orders").unwrap().as_str(), "orders");
        assert_eq!(ObjectName::new("orders-v2").unwrap().as_str(), "orders-v2");
        assert_eq!(ObjectName::new("_system").unwrap().as_str(), "_system");
    }

    #[test]
    fn empty_name_fails() {
        assert!(matches!(ObjectName::new(""), Err(NameError::Empty)));
    }

    #[test]
    fn invalid_characters_fail() {
        assert!(matches!(ObjectName::new("my orders"), Err(NameError::InvalidCharacters(_))));
        assert!(matches!(ObjectName::new("a/b"), Err(NameError::InvalidCharacters(_))));
    }

    #[test]
    fn overlong_name_fails() {
        let long = "x".repeat(256);
        assert!(matches!(ObjectName::new(long), Err(NameError::TooLong(256))));
    }
}

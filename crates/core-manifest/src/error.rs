//! Error types for manifest operations

use std::io;
use thiserror::Error;

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during manifest operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Manifest validation failed
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Manifest version not understood by this client
    #[error("Unsupported manifest version: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// App mode name or ordinal not in the known table
    #[error("Unknown app mode: {0}")]
    UnknownAppMode(String),

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Integration request carries an unusable pattern
    #[error("Invalid integration request pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

impl Error {
    /// Create a validation error with a message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Error::MissingField {
            field: field.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = Error::validation("test message");
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.to_string(), "Validation error: test message");
    }

    #[test]
    fn test_version_mismatch_error() {
        let err = Error::VersionMismatch {
            expected: 1,
            found: 7,
        };
        assert!(err.to_string().contains("expected 1"));
        assert!(err.to_string().contains("found 7"));
    }

    #[test]
    fn test_missing_field_error() {
        let err = Error::missing_field("metadata.appmode");
        assert_eq!(err.to_string(), "Missing required field: metadata.appmode");
    }
}

//! Error types for foreign fields.

use foreign_fields_repository::RecordRepositoryError;
use thiserror::Error;

use crate::validator::FieldValidationError;

/// Errors raised while saving foreign field values or preparing queries.
///
/// Structural problems (wrong value type, bad filter payloads) abort the
/// operation. Bad serialized data is recovered where it is read and never
/// surfaces here.
#[derive(Error, Debug)]
pub enum ForeignFieldError {
    /// The element's value for the field is not the field's model type.
    #[error("Invalid value for field '{handle}': expected {expected}")]
    InvalidValueType {
        handle: String,
        expected: &'static str,
    },

    /// A query filter names an attribute that is not persisted.
    #[error("Unknown filter attribute '{attribute}' for field '{handle}'")]
    UnknownFilterAttribute { handle: String, attribute: String },

    /// A query filter is not shaped like an attribute map.
    #[error("Malformed filter for field '{handle}': {reason}")]
    MalformedFilterPayload { handle: String, reason: String },

    #[error("Repository error: {0}")]
    Repository(#[from] RecordRepositoryError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value failed validation where the caller cannot continue without it.
    #[error("Validation error: {0}")]
    Validation(#[from] FieldValidationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ForeignFieldError {
    /// Create an invalid value type error.
    pub fn invalid_value_type(handle: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidValueType {
            handle: handle.into(),
            expected,
        }
    }

    /// Create an unknown filter attribute error.
    pub fn unknown_filter_attribute(
        handle: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::UnknownFilterAttribute {
            handle: handle.into(),
            attribute: attribute.into(),
        }
    }

    /// Create a malformed filter payload error.
    pub fn malformed_filter(handle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedFilterPayload {
            handle: handle.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

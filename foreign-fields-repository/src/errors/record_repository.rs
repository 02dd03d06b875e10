use foreign_fields_shared::RecordKey;
use thiserror::Error;

/// Represents errors that can occur within the record repository.
///
/// Covers database failures as well as records whose key does not fit the
/// storage mode of their field.
#[derive(Debug, Error)]
pub enum RecordRepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// A per-site field received a key without a site, or the other way round.
    #[error("Invalid record key {key:?} for field '{handle}': {reason}")]
    InvalidKey {
        handle: String,
        key: RecordKey,
        reason: &'static str,
    },

    /// The key belongs to another field.
    #[error("Record key {key:?} does not belong to field '{handle}'")]
    ForeignKey { handle: String, key: RecordKey },

    /// A stored row could not be turned back into a record.
    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: String, reason: String },

    /// The column list does not match the field's record attributes.
    #[error("Schema error for field '{handle}': {reason}")]
    SchemaError { handle: String, reason: String },
}

impl RecordRepositoryError {
    /// Create an invalid row error.
    pub fn invalid_row(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(handle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaError {
            handle: handle.into(),
            reason: reason.into(),
        }
    }
}

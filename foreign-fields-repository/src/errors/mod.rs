//! Error types for the record repository.
//!
//! Consolidates and re-exports errors raised by record store operations.

mod record_repository;

pub use record_repository::RecordRepositoryError;

//! This module defines and re-exports the interfaces for the record repository.

mod record_repository;

pub use record_repository::{check_record_key, RecordRepository};

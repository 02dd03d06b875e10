//! # Foreign Fields Repository
//!
//! This crate provides the record store for foreign field side tables. It
//! includes the `RecordRepository` interface, its error type, the side-table
//! schema contract, and implementations for PostgreSQL and for memory.

pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use errors::RecordRepositoryError;
pub use interfaces::{check_record_key, RecordRepository};
pub use memory::InMemoryRecordRepository;
pub use postgres::PostgresRecordRepository;
pub use schema::{AttributeColumn, ColumnType, TableSchema};

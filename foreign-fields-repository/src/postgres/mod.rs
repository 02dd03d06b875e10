//! PostgreSQL implementation of the record repository.
//!
//! Side tables have one column per record attribute, so the payload is moved in
//! and out as JSON: reads use `to_jsonb(row)` and writes go through
//! `jsonb_populate_record`, which maps JSON keys onto the table's typed columns.
//!
//! ## Key Features
//!
//! - Connection pooling with `sqlx::PgPool`
//! - Composite-key lookups with optional site
//! - Insert or in-place update with audit columns
//! - Table creation from a `TableSchema` inside a transaction

mod record_repository;

pub use record_repository::PostgresRecordRepository;

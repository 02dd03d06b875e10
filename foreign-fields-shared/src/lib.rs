//! # Foreign Fields Shared
//!
//! This crate defines the data structures shared by the foreign field engine and
//! its record store: element identities, field definitions and the records kept
//! in a field's side table.

pub mod types;

pub use types::{
    AttributeMap, AttributeRecord, ColumnType, Element, ElementId, ElementSnapshot, FieldDefinition,
    FieldId, FieldValue, RecordKey, SiteId,
};

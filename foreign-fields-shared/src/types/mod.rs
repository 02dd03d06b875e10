//! Core data types for foreign fields.
//!
//! Re-exports the element capability, field definitions and side-table records.

mod column_type;
mod element;
mod field_definition;
mod ids;
mod record;

pub use column_type::ColumnType;
pub use element::{Element, ElementSnapshot, FieldValue};
pub use field_definition::FieldDefinition;
pub use ids::{AttributeMap, ElementId, FieldId, SiteId};
pub use record::{AttributeRecord, RecordKey};

//! SQL types of side-table payload columns.

use serde::{Deserialize, Serialize};

/// SQL type of a payload column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    BigInteger,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    /// `varchar(n)`
    String(u16),
    Text,
    Json,
    Date,
    DateTime,
}

impl ColumnType {
    /// PostgreSQL spelling of the type.
    pub fn sql(&self) -> String {
        match self {
            Self::Integer => "integer".to_string(),
            Self::BigInteger => "bigint".to_string(),
            Self::Double => "double precision".to_string(),
            Self::Decimal { precision, scale } => format!("numeric({precision},{scale})"),
            Self::Boolean => "boolean".to_string(),
            Self::String(length) => format!("varchar({length})"),
            Self::Text => "text".to_string(),
            Self::Json => "jsonb".to_string(),
            Self::Date => "date".to_string(),
            Self::DateTime => "timestamp(0) without time zone".to_string(),
        }
    }

    /// Whether values of this type are stored as JSON documents.
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

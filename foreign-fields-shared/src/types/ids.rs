/// Identifier of a row in the host `elements` table.
pub type ElementId = i64;

/// Identifier of a field definition.
pub type FieldId = i64;

/// Identifier of a site (locale/variant scope).
pub type SiteId = i64;

/// Attribute name to value mapping, the serialized shape of an attribute bundle.
pub type AttributeMap = serde_json::Map<String, serde_json::Value>;

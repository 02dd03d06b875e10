//! Side-table record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{AttributeMap, ElementId, FieldId, SiteId};

/// Composite key of a side-table record.
///
/// `site_id` is `Some` exactly when the owning field stores per-site records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub element_id: ElementId,
    pub field_id: FieldId,
    pub site_id: Option<SiteId>,
}

impl RecordKey {
    pub fn new(element_id: ElementId, field_id: FieldId, site_id: Option<SiteId>) -> Self {
        Self {
            element_id,
            field_id,
            site_id,
        }
    }
}

/// A persisted attribute bundle.
///
/// `id` and the audit timestamps are filled in by the record store on save;
/// a record with `id == None` has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub id: Option<i64>,
    pub key: RecordKey,
    pub attributes: AttributeMap,
    pub date_created: Option<DateTime<Utc>>,
    pub date_updated: Option<DateTime<Utc>>,
    pub uid: Uuid,
}

impl AttributeRecord {
    /// A new, unsaved record for `key` with an empty payload.
    pub fn new(key: RecordKey) -> Self {
        Self {
            id: None,
            key,
            attributes: AttributeMap::new(),
            date_created: None,
            date_updated: None,
            uid: Uuid::new_v4(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Merge `attributes` into the payload.
    ///
    /// Only the given names are overwritten; everything else keeps its stored value.
    pub fn set_model_attributes(&mut self, attributes: AttributeMap) -> &mut Self {
        for (name, value) in attributes {
            self.attributes.insert(name, value);
        }
        self
    }

    pub fn model_attributes(&self) -> &AttributeMap {
        &self.attributes
    }
}

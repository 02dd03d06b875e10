//! Field definition types.
//!
//! A `FieldDefinition` describes one foreign field instance: where its records
//! live, whether they are stored per site, and which attributes are persisted
//! and propagated.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::column_type::ColumnType;
use super::element::Element;
use super::ids::FieldId;
use super::record::RecordKey;

/// Description of a single foreign field.
///
/// The set of `record_attributes` is fixed for the lifetime of the field: it
/// defines the side-table payload columns and is the only set of names a query
/// filter may refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: FieldId,
    pub handle: String,
    pub table_name: String,
    pub per_site_records: bool,
    pub record_attributes: Vec<String>,
    /// Attributes copied when a save propagates to other sites.
    /// `None` propagates every attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagated_attributes: Option<BTreeSet<String>>,
    /// Column types of the record attributes, when known.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attribute_types: BTreeMap<String, ColumnType>,
}

impl FieldDefinition {
    /// Create a definition storing one record per element.
    pub fn new<I, S>(
        id: FieldId,
        handle: impl Into<String>,
        table_name: impl Into<String>,
        record_attributes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            handle: handle.into(),
            table_name: table_name.into(),
            per_site_records: false,
            record_attributes: record_attributes.into_iter().map(Into::into).collect(),
            propagated_attributes: None,
            attribute_types: BTreeMap::new(),
        }
    }

    /// Store one record per (element, site) instead of one per element.
    pub fn with_per_site_records(mut self, per_site_records: bool) -> Self {
        self.per_site_records = per_site_records;
        self
    }

    /// Restrict propagation to the given attributes.
    pub fn with_propagated_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.propagated_attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Record the column types of the record attributes.
    pub fn with_attribute_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        self.attribute_types = types
            .into_iter()
            .map(|(name, column_type)| (name.into(), column_type))
            .collect();
        self
    }

    /// Column type of the record attribute `name`, if declared.
    pub fn attribute_type(&self, name: &str) -> Option<ColumnType> {
        self.attribute_types.get(name).copied()
    }

    /// Whether `name` is a persisted attribute of this field.
    pub fn is_record_attribute(&self, name: &str) -> bool {
        self.record_attributes.iter().any(|attribute| attribute == name)
    }

    /// Whether `name` is copied when a save propagates to another site.
    pub fn is_attribute_propagated(&self, name: &str) -> bool {
        match &self.propagated_attributes {
            Some(attributes) => attributes.contains(name),
            None => true,
        }
    }

    /// The record key for `element`, or `None` if the element has no id yet.
    pub fn record_key(&self, element: &dyn Element) -> Option<RecordKey> {
        let element_id = element.id()?;
        let site_id = self.per_site_records.then(|| element.site_id());

        Some(RecordKey {
            element_id,
            field_id: self.id,
            site_id,
        })
    }

    /// Alias of the computed column carrying eager-loaded data.
    pub fn eager_load_alias(&self) -> String {
        format!("field:{}", self.handle)
    }
}

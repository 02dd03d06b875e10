//! Foreign fields.
//!
//! `ForeignField<M>` ties a field definition to its record store and to the
//! attribute bundle `M`. It converts raw values into models, persists models
//! when their element is saved and plugs the field into element queries.

use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::sync::Arc;

use foreign_fields_repository::{ColumnType, RecordRepository, TableSchema};
use foreign_fields_shared::{AttributeMap, AttributeRecord, Element, FieldDefinition, FieldId};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::errors::ForeignFieldError;
use crate::model::{AttributeBundle, ForeignModel};
use crate::query::{
    attach_to, prepare_query_filter, AttachOptions, AttachOutcome, ElementQueryInterface,
};
use crate::validator::ForeignModelValidator;

/// How a field's value may differ between the sites of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationMethod {
    None,
    Site,
    SiteGroup,
    Language,
    Custom,
}

impl TranslationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Site => "site",
            Self::SiteGroup => "siteGroup",
            Self::Language => "language",
            Self::Custom => "custom",
        }
    }
}

/// A value handed to `normalize_value`.
#[derive(Debug, Clone)]
pub enum RawValue<M: AttributeBundle> {
    /// An already normalized model, returned as is.
    Model(ForeignModel<M>),
    Attributes(AttributeMap),
    /// The JSON text produced by `serialize_value`.
    Serialized(String),
    /// No value: the persisted record is loaded.
    Absent,
}

impl<M: AttributeBundle> From<ForeignModel<M>> for RawValue<M> {
    fn from(model: ForeignModel<M>) -> Self {
        Self::Model(model)
    }
}

impl<M: AttributeBundle> From<AttributeMap> for RawValue<M> {
    fn from(attributes: AttributeMap) -> Self {
        Self::Attributes(attributes)
    }
}

impl<M: AttributeBundle> From<String> for RawValue<M> {
    fn from(text: String) -> Self {
        Self::Serialized(text)
    }
}

impl<M: AttributeBundle> From<&str> for RawValue<M> {
    fn from(text: &str) -> Self {
        Self::Serialized(text.to_string())
    }
}

/// A field storing `M` bundles in a side table.
pub struct ForeignField<M: AttributeBundle> {
    definition: Arc<FieldDefinition>,
    repository: Arc<dyn RecordRepository>,
    _model: PhantomData<fn() -> M>,
}

impl<M: AttributeBundle> Clone for ForeignField<M> {
    fn clone(&self) -> Self {
        Self {
            definition: self.definition.clone(),
            repository: self.repository.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: AttributeBundle> ForeignField<M> {
    /// Creates a field whose record attributes are the bundle's record columns.
    pub fn new(
        id: FieldId,
        handle: impl Into<String>,
        table_name: impl Into<String>,
        repository: Arc<dyn RecordRepository>,
    ) -> Self {
        let attributes = M::record_columns().iter().map(|column| column.name);
        let definition = FieldDefinition::new(id, handle, table_name, attributes)
            .with_attribute_types(column_types::<M>());
        Self {
            definition: Arc::new(definition),
            repository,
            _model: PhantomData,
        }
    }

    /// Creates a field from an existing definition.
    ///
    /// Fails when the definition's record attributes do not match the bundle's
    /// record columns.
    pub fn from_definition(
        definition: FieldDefinition,
        repository: Arc<dyn RecordRepository>,
    ) -> Result<Self, ForeignFieldError> {
        TableSchema::for_field(&definition, M::record_columns())?;
        Ok(Self {
            definition: Arc::new(definition.with_attribute_types(column_types::<M>())),
            repository,
            _model: PhantomData,
        })
    }

    pub fn with_per_site_records(mut self, per_site_records: bool) -> Self {
        Arc::make_mut(&mut self.definition).per_site_records = per_site_records;
        self
    }

    /// Only copy `attributes` when a save propagates to another site.
    pub fn with_propagated_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let definition = (*self.definition).clone();
        self.definition = Arc::new(definition.with_propagated_attributes(attributes));
        self
    }

    pub fn definition(&self) -> &Arc<FieldDefinition> {
        &self.definition
    }

    pub fn handle(&self) -> &str {
        &self.definition.handle
    }

    pub fn has_per_site_records(&self) -> bool {
        self.definition.per_site_records
    }

    pub fn repository(&self) -> &Arc<dyn RecordRepository> {
        &self.repository
    }

    pub fn create_model(
        &self,
        attributes: &AttributeMap,
        owner: Option<Arc<dyn Element>>,
    ) -> ForeignModel<M> {
        ForeignModel::from_attributes(self.definition.clone(), owner, attributes)
    }

    /// Turns a raw value into a model owned by `owner`.
    ///
    /// Unparsable serialized text yields an empty model; the parse error is
    /// logged, not returned.
    pub async fn normalize_value(
        &self,
        raw: RawValue<M>,
        owner: Option<Arc<dyn Element>>,
    ) -> Result<ForeignModel<M>, ForeignFieldError> {
        let attributes = match raw {
            RawValue::Model(model) => return Ok(model),
            RawValue::Attributes(attributes) => attributes,
            RawValue::Serialized(text) => self.decode_attributes(&text),
            RawValue::Absent => match self.find_record(owner.as_deref()).await? {
                Some(record) => record.attributes,
                None => AttributeMap::new(),
            },
        };

        Ok(self.create_model(&attributes, owner))
    }

    /// Builds a model from the `field:<handle>` column of a query row.
    ///
    /// `NULL` means the element has no record; the record store is never read.
    pub fn normalize_eager_loaded(
        &self,
        value: Option<&Value>,
        owner: Option<Arc<dyn Element>>,
    ) -> ForeignModel<M> {
        let attributes = match value {
            None | Some(Value::Null) => AttributeMap::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(text)) => self.decode_attributes(text),
            Some(other) => {
                error!(field = %self.handle(), value = %other, "Eager-loaded value is not an object");
                AttributeMap::new()
            }
        };

        self.create_model(&attributes, owner)
    }

    /// The model as a JSON object text.
    pub fn serialize_value(&self, model: &ForeignModel<M>) -> Result<String, ForeignFieldError> {
        Ok(serde_json::to_string(model.attributes())?)
    }

    fn decode_attributes(&self, text: &str) -> AttributeMap {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => AttributeMap::new(),
            Err(e) => {
                error!(field = %self.handle(), error = %e, "Could not decode serialized value");
                AttributeMap::new()
            }
        }
    }

    /// Whether saving `element` writes the record.
    ///
    /// A record shared by all sites is only written by the primary save, never
    /// by the saves propagating it to other sites.
    pub fn should_update_record(&self, element: &dyn Element) -> bool {
        !(element.is_propagating() && !self.definition.per_site_records)
    }

    /// The attributes a save of `element` writes.
    ///
    /// Propagating saves only write propagated attributes.
    pub fn record_attributes_for(
        &self,
        model: &ForeignModel<M>,
        element: &dyn Element,
    ) -> Result<AttributeMap, ForeignFieldError> {
        let mut attributes = model.to_attribute_map()?;
        if element.is_propagating() {
            attributes.retain(|name, _| self.definition.is_attribute_propagated(name));
        }
        Ok(attributes)
    }

    pub async fn find_record(
        &self,
        element: Option<&dyn Element>,
    ) -> Result<Option<AttributeRecord>, ForeignFieldError> {
        let Some(key) = element.and_then(|element| self.definition.record_key(element)) else {
            return Ok(None);
        };

        Ok(self.repository.find(&self.definition, &key).await?)
    }

    pub async fn find_or_create_record(
        &self,
        element: &dyn Element,
    ) -> Result<Option<AttributeRecord>, ForeignFieldError> {
        let Some(key) = self.definition.record_key(element) else {
            return Ok(None);
        };

        Ok(Some(
            self.repository
                .find_or_create(&self.definition, &key)
                .await?,
        ))
    }

    /// Persists the field value of a saved element.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - The record as written
    /// * `Ok(None)` - Nothing had to be written
    /// * `Err(ForeignFieldError::InvalidValueType)` - The element's value is not a `ForeignModel<M>`
    pub async fn after_save(
        &self,
        element: &dyn Element,
        is_new: bool,
    ) -> Result<Option<AttributeRecord>, ForeignFieldError> {
        let handle = self.handle();
        let value = element.field_value(handle);
        let model = value
            .as_deref()
            .and_then(|value| value.downcast_ref::<ForeignModel<M>>())
            .ok_or_else(|| {
                ForeignFieldError::invalid_value_type(handle, type_name::<ForeignModel<M>>())
            })?;

        if !self.should_update_record(element) {
            debug!(field = %handle, element_id = ?element.id(), "Skipping propagated save");
            return Ok(None);
        }

        let Some(key) = self.definition.record_key(element) else {
            warn!(field = %handle, "Cannot save a record for an element without id");
            return Ok(None);
        };

        let attributes = self.record_attributes_for(model, element)?;
        let mut record = match self.repository.find(&self.definition, &key).await? {
            Some(record) => record,
            None if model.is_empty() => {
                debug!(field = %handle, ?key, "Not creating a record for an empty value");
                return Ok(None);
            }
            None => AttributeRecord::new(key),
        };

        let created = record.is_new();
        record.set_model_attributes(attributes);
        let saved = self.repository.save(&self.definition, record).await?;

        info!(
            field = %handle,
            key = ?saved.key,
            created,
            element_is_new = is_new,
            "Saved foreign field record"
        );
        Ok(Some(saved))
    }

    /// Removes the records of a deleted element.
    pub async fn after_element_delete(&self, element: &dyn Element) -> Result<u64, ForeignFieldError> {
        let Some(element_id) = element.id() else {
            return Ok(0);
        };
        Ok(self
            .repository
            .delete_for_element(&self.definition, element_id)
            .await?)
    }

    /// Removes every record of this field.
    pub async fn after_field_delete(&self) -> Result<u64, ForeignFieldError> {
        Ok(self.repository.delete_for_field(&self.definition).await?)
    }

    /// Attaches the field to `query`, filtered by `value`.
    pub fn modify_query(
        &self,
        query: &mut dyn ElementQueryInterface,
        value: Option<&Value>,
    ) -> Result<AttachOutcome, ForeignFieldError> {
        let filters = prepare_query_filter(&self.definition, value)?;
        attach_to(query, &self.definition, AttachOptions::with_filters(filters))
    }

    /// Attaches the field to an index listing query, always eager-loading it.
    pub fn modify_index_query(
        &self,
        query: &mut dyn ElementQueryInterface,
    ) -> Result<AttachOutcome, ForeignFieldError> {
        attach_to(query, &self.definition, AttachOptions::eager_load())
    }

    /// True when `value` is not a model of this field or the model is empty.
    pub fn is_value_empty(&self, value: &dyn Any) -> bool {
        value
            .downcast_ref::<ForeignModel<M>>()
            .map_or(true, |model| model.is_empty())
    }

    pub fn supported_translation_methods(&self) -> Vec<TranslationMethod> {
        if !self.definition.per_site_records {
            return vec![TranslationMethod::None];
        }

        vec![
            TranslationMethod::None,
            TranslationMethod::Site,
            TranslationMethod::SiteGroup,
            TranslationMethod::Language,
            TranslationMethod::Custom,
        ]
    }

    /// The side table this field needs.
    pub fn table_schema(&self) -> Result<TableSchema, ForeignFieldError> {
        Ok(TableSchema::for_field(&self.definition, M::record_columns())?)
    }

    /// Creates the side table, pointing its foreign keys at the given host tables.
    pub async fn install(&self, elements_table: &str, fields_table: &str) -> Result<(), ForeignFieldError> {
        let schema = self
            .table_schema()?
            .with_host_tables(elements_table, fields_table);
        self.repository.ensure_table(&schema).await?;
        Ok(())
    }

    pub async fn uninstall(&self) -> Result<(), ForeignFieldError> {
        self.repository
            .drop_table(&self.definition.table_name)
            .await?;
        Ok(())
    }

    pub fn validator(&self) -> ForeignModelValidator<M> {
        ForeignModelValidator::new(self.handle())
    }
}

fn column_types<M: AttributeBundle>() -> impl Iterator<Item = (&'static str, ColumnType)> {
    M::record_columns()
        .iter()
        .map(|column| (column.name, column.column_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreign_fields_repository::{AttributeColumn, ColumnType, InMemoryRecordRepository};
    use foreign_fields_shared::{ElementSnapshot, RecordKey};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Rating {
        score: Option<i64>,
        comment: Option<String>,
    }

    impl AttributeBundle for Rating {
        fn record_columns() -> &'static [AttributeColumn] {
            const COLUMNS: &[AttributeColumn] = &[
                AttributeColumn::new("score", ColumnType::Integer),
                AttributeColumn::new("comment", ColumnType::Text),
            ];
            COLUMNS
        }

        fn is_empty(&self) -> bool {
            self.score.is_none() && self.comment.is_none()
        }
    }

    fn setup() -> (Arc<InMemoryRecordRepository>, ForeignField<Rating>) {
        let repository = Arc::new(InMemoryRecordRepository::new());
        let field = ForeignField::new(7, "rating", "ratings", repository.clone());
        (repository, field)
    }

    fn rating(score: i64, comment: &str) -> Rating {
        Rating {
            score: Some(score),
            comment: Some(comment.to_string()),
        }
    }

    #[test]
    fn test_definition_from_bundle_columns() {
        let (_, field) = setup();
        assert_eq!(field.definition().record_attributes, vec!["score", "comment"]);
        assert_eq!(field.definition().attribute_type("score"), Some(ColumnType::Integer));
        assert_eq!(field.definition().attribute_type("comment"), Some(ColumnType::Text));
        assert!(!field.has_per_site_records());
    }

    #[test]
    fn test_from_definition_checks_columns() {
        let repository: Arc<dyn RecordRepository> = Arc::new(InMemoryRecordRepository::new());
        let definition = FieldDefinition::new(7, "rating", "ratings", ["score"]);

        let err = ForeignField::<Rating>::from_definition(definition, repository).err().unwrap();
        assert!(matches!(err, ForeignFieldError::Repository(_)));
    }

    #[tokio::test]
    async fn test_normalize_model_passes_through() {
        let (_, field) = setup();
        let model = ForeignModel::new(field.definition().clone(), None, rating(3, "fine"));

        let normalized = field.normalize_value(model.clone().into(), None).await.unwrap();
        assert_eq!(normalized.attributes(), model.attributes());
    }

    #[tokio::test]
    async fn test_normalize_invalid_json_yields_empty_model() {
        let (_, field) = setup();
        let model = field.normalize_value("{not json".into(), None).await.unwrap();

        assert!(model.is_empty());
    }

    #[tokio::test]
    async fn test_normalize_absent_loads_record() {
        let (repository, field) = setup();
        let mut record = AttributeRecord::new(RecordKey::new(42, 7, None));
        record.set_model_attributes(json!({"score": 4, "comment": "stored"}).as_object().cloned().unwrap());
        repository.save(field.definition(), record).await.unwrap();

        let owner: Arc<dyn Element> = Arc::new(ElementSnapshot::new(42, 1));
        let model = field.normalize_value(RawValue::Absent, Some(owner)).await.unwrap();
        assert_eq!(model.attributes(), &rating(4, "stored"));

        let unsaved: Arc<dyn Element> = Arc::new(ElementSnapshot::unsaved(1));
        let model = field.normalize_value(RawValue::Absent, Some(unsaved)).await.unwrap();
        assert!(model.is_empty());
    }

    #[test]
    fn test_normalize_eager_loaded() {
        let (_, field) = setup();

        assert!(field.normalize_eager_loaded(Some(&Value::Null), None).is_empty());
        assert!(field.normalize_eager_loaded(None, None).is_empty());

        let value = json!({"score": 2, "comment": null});
        let model = field.normalize_eager_loaded(Some(&value), None);
        assert_eq!(model.attributes().score, Some(2));
        assert_eq!(model.attributes().comment, None);
    }

    #[tokio::test]
    async fn test_after_save_rejects_wrong_value_type() {
        let (repository, field) = setup();
        let element = ElementSnapshot::new(42, 1).with_field_value("rating", "five stars");

        let err = field.after_save(&element, true).await.unwrap_err();
        assert!(matches!(err, ForeignFieldError::InvalidValueType { .. }));

        let missing = ElementSnapshot::new(42, 1);
        assert!(field.after_save(&missing, true).await.is_err());
        assert_eq!(repository.save_count(), 0);
    }

    #[tokio::test]
    async fn test_after_save_skips_empty_value_without_record() {
        let (repository, field) = setup();
        let model = ForeignModel::<Rating>::empty(field.definition().clone(), None);
        let element = ElementSnapshot::new(42, 1).with_field_value("rating", model);

        assert!(field.after_save(&element, true).await.unwrap().is_none());
        assert_eq!(repository.save_count(), 0);
    }

    #[tokio::test]
    async fn test_after_save_clears_existing_record_with_empty_value() {
        let (repository, field) = setup();
        let full = ForeignModel::new(field.definition().clone(), None, rating(4, "ok"));
        field
            .after_save(&ElementSnapshot::new(42, 1).with_field_value("rating", full), true)
            .await
            .unwrap();

        let empty = ForeignModel::<Rating>::empty(field.definition().clone(), None);
        let saved = field
            .after_save(&ElementSnapshot::new(42, 1).with_field_value("rating", empty), false)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved.attributes["score"], Value::Null);
        assert_eq!(repository.save_count(), 2);
    }

    #[tokio::test]
    async fn test_propagating_save_of_shared_record_is_skipped() {
        let (_, field) = setup();
        let element = ElementSnapshot::new(42, 2).propagating(true);
        assert!(!field.should_update_record(&element));

        let per_site = setup().1.with_per_site_records(true);
        assert!(per_site.should_update_record(&element));
    }

    #[tokio::test]
    async fn test_propagation_only_writes_propagated_attributes() {
        let (repository, field) = setup();
        let field = field
            .with_per_site_records(true)
            .with_propagated_attributes(["score"]);

        let local = ForeignModel::new(field.definition().clone(), None, rating(1, "local"));
        field
            .after_save(&ElementSnapshot::new(42, 2).with_field_value("rating", local), false)
            .await
            .unwrap();

        let primary = ForeignModel::new(field.definition().clone(), None, rating(5, "primary"));
        let propagated = ElementSnapshot::new(42, 2)
            .propagating(true)
            .with_field_value("rating", primary);
        let saved = field.after_save(&propagated, false).await.unwrap().unwrap();

        assert_eq!(saved.attributes["score"], json!(5));
        assert_eq!(saved.attributes["comment"], json!("local"));
        assert_eq!(repository.records("ratings").len(), 1);
    }

    #[test]
    fn test_is_value_empty() {
        let (_, field) = setup();
        let empty = ForeignModel::<Rating>::empty(field.definition().clone(), None);
        let full = ForeignModel::new(field.definition().clone(), None, rating(2, "x"));

        assert!(field.is_value_empty(&empty));
        assert!(!field.is_value_empty(&full));
        assert!(field.is_value_empty(&"not a model"));
    }

    #[test]
    fn test_supported_translation_methods() {
        let (_, field) = setup();
        assert_eq!(field.supported_translation_methods(), vec![TranslationMethod::None]);

        let per_site = field.with_per_site_records(true);
        let methods = per_site.supported_translation_methods();
        assert_eq!(methods.len(), 5);
        assert_eq!(methods[2].as_str(), "siteGroup");
    }

    #[tokio::test]
    async fn test_install_and_delete_hooks() {
        let (repository, field) = setup();
        field.install("elements", "fields").await.unwrap();
        assert!(repository.has_table("ratings"));

        let model = ForeignModel::new(field.definition().clone(), None, rating(3, "x"));
        let element = ElementSnapshot::new(42, 1).with_field_value("rating", model);
        field.after_save(&element, true).await.unwrap();

        assert_eq!(field.after_element_delete(&element).await.unwrap(), 1);
        assert_eq!(field.after_field_delete().await.unwrap(), 0);

        field.uninstall().await.unwrap();
        assert!(!repository.has_table("ratings"));
    }
}

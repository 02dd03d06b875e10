//! Attribute bundles and the models wrapping them.
//!
//! A field kind is described by an `AttributeBundle`: a plain serde struct
//! listing its persisted columns. `ForeignModel<M>` wraps one bundle value
//! together with the field it belongs to and the element owning it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use foreign_fields_repository::AttributeColumn;
use foreign_fields_shared::{AttributeMap, Element, FieldDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

/// The contract a field kind's attribute bundle implements.
pub trait AttributeBundle:
    Clone + fmt::Debug + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Payload columns of the side table, one per persisted attribute.
    fn record_columns() -> &'static [AttributeColumn];

    /// Name used in validation messages.
    fn model_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether the bundle carries no meaningful value.
    fn is_empty(&self) -> bool {
        false
    }

    /// Field-level validation of the bundle.
    fn validate(&self) -> Result<(), ModelErrors> {
        Ok(())
    }
}

/// Validation messages grouped by attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ModelErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `attribute`.
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, attribute: &str) -> &[String] {
        self.errors
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every message, in attribute order, joined by spaces.
    pub fn summary(&self) -> String {
        self.errors
            .values()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `Ok(())` when no message was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// An attribute bundle bound to its field and owning element.
///
/// The root element is resolved lazily through `Element::nested_owner` and
/// cached; rebinding to another owner with `with_owner` yields a model whose
/// cache is empty again.
#[derive(Clone)]
pub struct ForeignModel<M: AttributeBundle> {
    field: Arc<FieldDefinition>,
    owner: Option<Arc<dyn Element>>,
    root: OnceLock<Option<Arc<dyn Element>>>,
    attributes: M,
}

impl<M: AttributeBundle> ForeignModel<M> {
    pub fn new(field: Arc<FieldDefinition>, owner: Option<Arc<dyn Element>>, attributes: M) -> Self {
        Self {
            field,
            owner,
            root: OnceLock::new(),
            attributes,
        }
    }

    /// A model holding the bundle's default values.
    pub fn empty(field: Arc<FieldDefinition>, owner: Option<Arc<dyn Element>>) -> Self {
        Self::new(field, owner, M::default())
    }

    /// Builds a model by assigning `values` over the bundle defaults.
    ///
    /// Each attribute is assigned on its own, `null` included. A value the
    /// bundle cannot deserialize is logged and skipped; the other attributes
    /// are still assigned.
    pub fn from_attributes(
        field: Arc<FieldDefinition>,
        owner: Option<Arc<dyn Element>>,
        values: &AttributeMap,
    ) -> Self {
        let attributes = bundle_from_map::<M>(&field.handle, values);
        Self::new(field, owner, attributes)
    }

    pub fn field(&self) -> &Arc<FieldDefinition> {
        &self.field
    }

    /// The element this model was created for.
    pub fn owner(&self) -> Option<&Arc<dyn Element>> {
        self.owner.as_ref()
    }

    /// The top-level element above the owner.
    ///
    /// Walks `nested_owner` until an element reports none. `None` when the
    /// model has no owner.
    pub fn root(&self) -> Option<Arc<dyn Element>> {
        self.root
            .get_or_init(|| {
                let mut current = self.owner.clone()?;
                while let Some(parent) = current.nested_owner() {
                    current = parent;
                }
                Some(current)
            })
            .clone()
    }

    /// Binds the model to `owner`.
    ///
    /// Returns the model unchanged when `owner` is the current owner.
    pub fn with_owner(self, owner: Option<Arc<dyn Element>>) -> Self {
        let unchanged = match (&self.owner, &owner) {
            (Some(current), Some(new)) => Arc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return self;
        }

        Self::new(self.field, owner, self.attributes)
    }

    pub fn attributes(&self) -> &M {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut M {
        &mut self.attributes
    }

    pub fn into_attributes(self) -> M {
        self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn validate(&self) -> Result<(), ModelErrors> {
        self.attributes.validate()
    }

    /// The bundle as an attribute map, restricted to persisted attributes.
    pub fn to_attribute_map(&self) -> Result<AttributeMap, serde_json::Error> {
        let Value::Object(map) = serde_json::to_value(&self.attributes)? else {
            return Ok(AttributeMap::new());
        };

        Ok(map
            .into_iter()
            .filter(|(name, _)| self.field.is_record_attribute(name))
            .collect())
    }
}

impl<M: AttributeBundle> fmt::Debug for ForeignModel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignModel")
            .field("field", &self.field.handle)
            .field("owner", &self.owner.as_ref().and_then(|owner| owner.id()))
            .field("attributes", &self.attributes)
            .finish()
    }
}

fn bundle_from_map<M: AttributeBundle>(handle: &str, values: &AttributeMap) -> M {
    let mut merged = match serde_json::to_value(M::default()) {
        Ok(Value::Object(map)) => map,
        _ => AttributeMap::new(),
    };

    for (name, value) in values {
        let mut candidate = merged.clone();
        candidate.insert(name.clone(), value.clone());
        match serde_json::from_value::<M>(Value::Object(candidate.clone())) {
            Ok(_) => merged = candidate,
            Err(e) => {
                error!(field = %handle, attribute = %name, error = %e, "Skipping invalid attribute value");
            }
        }
    }

    match serde_json::from_value(Value::Object(merged)) {
        Ok(attributes) => attributes,
        Err(e) => {
            error!(field = %handle, error = %e, "Could not apply attributes to model");
            M::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreign_fields_repository::ColumnType;
    use foreign_fields_shared::ElementSnapshot;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Link {
        url: String,
        target: Option<String>,
        clicks: u32,
    }

    impl AttributeBundle for Link {
        fn record_columns() -> &'static [AttributeColumn] {
            const COLUMNS: &[AttributeColumn] = &[
                AttributeColumn::new("url", ColumnType::Text),
                AttributeColumn::new("target", ColumnType::String(32)),
            ];
            COLUMNS
        }

        fn is_empty(&self) -> bool {
            self.url.is_empty()
        }

        fn validate(&self) -> Result<(), ModelErrors> {
            let mut errors = ModelErrors::new();
            if !self.url.is_empty() && !self.url.contains("://") {
                errors.add("url", "Url is not a valid URL.");
            }
            errors.into_result()
        }
    }

    fn field() -> Arc<FieldDefinition> {
        Arc::new(FieldDefinition::new(3, "link", "links", ["url", "target"]))
    }

    fn element(id: i64) -> Arc<dyn Element> {
        Arc::new(ElementSnapshot::new(id, 1))
    }

    #[test]
    fn test_from_attributes_overlays_defaults() {
        let values = json!({"url": "https://example.com", "target": null, "clicks": null});
        let model = ForeignModel::<Link>::from_attributes(field(), None, values.as_object().unwrap());

        assert_eq!(model.attributes().url, "https://example.com");
        assert_eq!(model.attributes().target, None);
        assert_eq!(model.attributes().clicks, 0);
    }

    #[test]
    fn test_from_attributes_falls_back_to_defaults() {
        let values = json!({"url": 12});
        let model = ForeignModel::<Link>::from_attributes(field(), None, values.as_object().unwrap());

        assert_eq!(model.attributes(), &Link::default());
        assert!(model.is_empty());
    }

    #[test]
    fn test_from_attributes_skips_only_invalid_values() {
        let values = json!({"url": "https://example.com", "target": "_blank", "clicks": "many"});
        let model = ForeignModel::<Link>::from_attributes(field(), None, values.as_object().unwrap());

        assert_eq!(model.attributes().url, "https://example.com");
        assert_eq!(model.attributes().target.as_deref(), Some("_blank"));
        assert_eq!(model.attributes().clicks, 0);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Badge {
        label: Option<String>,
    }

    impl Default for Badge {
        fn default() -> Self {
            Self {
                label: Some("new".to_string()),
            }
        }
    }

    impl AttributeBundle for Badge {
        fn record_columns() -> &'static [AttributeColumn] {
            const COLUMNS: &[AttributeColumn] = &[AttributeColumn::new("label", ColumnType::Text)];
            COLUMNS
        }
    }

    #[test]
    fn test_from_attributes_null_clears_default() {
        let badge_field = Arc::new(FieldDefinition::new(4, "badge", "badges", ["label"]));
        let model = ForeignModel::<Badge>::from_attributes(
            badge_field.clone(),
            None,
            json!({"label": null}).as_object().unwrap(),
        );
        assert_eq!(model.attributes().label, None);

        let untouched = ForeignModel::<Badge>::from_attributes(badge_field, None, &AttributeMap::new());
        assert_eq!(untouched.attributes().label.as_deref(), Some("new"));
    }

    #[test]
    fn test_attribute_map_is_restricted_to_record_attributes() {
        let link = Link {
            url: "https://example.com".to_string(),
            target: Some("_blank".to_string()),
            clicks: 9,
        };
        let map = ForeignModel::new(field(), None, link).to_attribute_map().unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["target"], json!("_blank"));
        assert!(map.get("clicks").is_none());
    }

    #[test]
    fn test_root_walks_nested_owners() {
        let entry = element(1);
        let outer: Arc<dyn Element> = Arc::new(ElementSnapshot::new(2, 1).nested_in(entry.clone()));
        let middle: Arc<dyn Element> = Arc::new(ElementSnapshot::new(3, 1).nested_in(outer));
        let inner: Arc<dyn Element> = Arc::new(ElementSnapshot::new(4, 1).nested_in(middle));

        let model = ForeignModel::<Link>::empty(field(), Some(inner.clone()));

        let root = model.root().unwrap();
        assert!(Arc::ptr_eq(&root, &entry));
        assert!(Arc::ptr_eq(model.owner().unwrap(), &inner));
    }

    #[test]
    fn test_root_of_unowned_model_is_none() {
        let model = ForeignModel::<Link>::empty(field(), None);
        assert!(model.root().is_none());
    }

    #[test]
    fn test_root_of_top_level_owner_is_owner() {
        let entry = element(1);
        let model = ForeignModel::<Link>::empty(field(), Some(entry.clone()));
        assert!(Arc::ptr_eq(&model.root().unwrap(), &entry));
    }

    #[test]
    fn test_with_owner_clears_memoized_root() {
        let first = element(1);
        let second = element(2);
        let model = ForeignModel::<Link>::empty(field(), Some(first.clone()));
        assert_eq!(model.root().unwrap().id(), Some(1));

        let same = model.with_owner(Some(first.clone()));
        assert!(same.root.get().is_some());

        let rebound = same.with_owner(Some(second));
        assert!(rebound.root.get().is_none());
        assert_eq!(rebound.root().unwrap().id(), Some(2));
    }

    #[test]
    fn test_model_errors_summary() {
        let mut errors = ModelErrors::new();
        errors.add("url", "Url is not a valid URL.");
        errors.add("target", "Target is too long.");

        assert_eq!(errors.get("url").len(), 1);
        assert!(errors.get("clicks").is_empty());
        assert_eq!(errors.summary(), "Target is too long. Url is not a valid URL.");
    }
}

//! Query lifecycle hooks.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use foreign_fields_shared::FieldDefinition;
use tracing::debug;

use super::dialect::Dialect;
use super::element_query::ElementQuery;
use super::extension::{attach_to, prepare_query_filter, AttachOptions};
use crate::errors::ForeignFieldError;

/// Runs on an element query right before its SQL builders are created.
pub trait BeforePrepareHook: Send + Sync {
    fn before_prepare(&self, query: &mut ElementQuery) -> Result<(), ForeignFieldError>;
}

/// Source of the foreign fields used by an element type's field layouts.
pub trait FieldLayoutProvider: Send + Sync {
    /// Foreign fields of every layout of `element_type`, each field once.
    fn foreign_fields(&self, element_type: &str) -> Vec<Arc<FieldDefinition>>;
}

/// Settings shared by every query prepared in one context.
#[derive(Clone, Default)]
pub struct QueryContext {
    dialect: Dialect,
    hooks: Vec<Arc<dyn BeforePrepareHook>>,
}

impl QueryContext {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn BeforePrepareHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn hooks(&self) -> &[Arc<dyn BeforePrepareHook>] {
        &self.hooks
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("dialect", &self.dialect)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Field layouts registered up front, per element type.
#[derive(Debug, Clone, Default)]
pub struct StaticFieldLayouts {
    layouts: HashMap<String, Vec<Vec<Arc<FieldDefinition>>>>,
}

impl StaticFieldLayouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layout of `element_type` made of `fields`.
    pub fn add_layout(
        &mut self,
        element_type: impl Into<String>,
        fields: Vec<Arc<FieldDefinition>>,
    ) -> &mut Self {
        self.layouts
            .entry(element_type.into())
            .or_default()
            .push(fields);
        self
    }
}

impl FieldLayoutProvider for StaticFieldLayouts {
    fn foreign_fields(&self, element_type: &str) -> Vec<Arc<FieldDefinition>> {
        let mut seen = BTreeSet::new();
        self.layouts
            .get(element_type)
            .into_iter()
            .flatten()
            .flatten()
            .filter(|field| seen.insert(field.id))
            .cloned()
            .collect()
    }
}

/// Attaches every foreign field of the queried element type, with the
/// filter payload set through `ElementQuery::field_param`.
pub struct ForeignFieldFilterHook {
    layouts: Arc<dyn FieldLayoutProvider>,
}

impl ForeignFieldFilterHook {
    pub fn new(layouts: Arc<dyn FieldLayoutProvider>) -> Self {
        Self { layouts }
    }
}

impl BeforePrepareHook for ForeignFieldFilterHook {
    fn before_prepare(&self, query: &mut ElementQuery) -> Result<(), ForeignFieldError> {
        if !query.with_custom_fields {
            return Ok(());
        }

        for field in self.layouts.foreign_fields(&query.element_type) {
            let filters = prepare_query_filter(&field, query.get_field_param(&field.handle))?;
            let outcome = attach_to(query, &field, AttachOptions::with_filters(filters))?;
            debug!(field = %field.handle, ?outcome, "Foreign field filter hook");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::extension::AttachOutcome;
    use serde_json::json;

    fn rating() -> Arc<FieldDefinition> {
        Arc::new(FieldDefinition::new(7, "rating", "ratings", ["score", "comment"]))
    }

    fn link() -> Arc<FieldDefinition> {
        Arc::new(FieldDefinition::new(3, "link", "links", ["url", "target"]))
    }

    fn hook() -> ForeignFieldFilterHook {
        let mut layouts = StaticFieldLayouts::new();
        layouts
            .add_layout("entry", vec![rating(), link()])
            .add_layout("entry", vec![rating()]);
        ForeignFieldFilterHook::new(Arc::new(layouts))
    }

    #[test]
    fn test_layouts_are_deduplicated() {
        let mut layouts = StaticFieldLayouts::new();
        layouts
            .add_layout("entry", vec![rating(), link()])
            .add_layout("entry", vec![rating()]);

        let ids: Vec<_> = layouts.foreign_fields("entry").iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![7, 3]);
        assert!(layouts.foreign_fields("asset").is_empty());
    }

    #[test]
    fn test_hook_attaches_declared_filters() {
        let mut query = ElementQuery::new("entry").field_param("rating", json!({"score": ">= 4"}));
        hook().before_prepare(&mut query).unwrap();

        let attachment = query.attachment(7).unwrap();
        assert!(attachment.enable_join());
        assert!(!attachment.enable_eager_load());
        assert!(query.attachment(3).is_none());
    }

    #[test]
    fn test_hook_honors_with() {
        let mut query = ElementQuery::new("entry").with("link");
        hook().before_prepare(&mut query).unwrap();

        assert!(query.attachment(3).unwrap().enable_eager_load());
        assert!(query.attachment(7).is_none());
    }

    #[test]
    fn test_hook_skips_queries_without_custom_fields() {
        let mut query = ElementQuery::new("entry")
            .with_custom_fields(false)
            .field_param("rating", json!({"score": 4}));
        hook().before_prepare(&mut query).unwrap();

        assert_eq!(query.attachments().count(), 0);
    }

    #[test]
    fn test_hook_rejects_unknown_filter_attribute() {
        let mut query = ElementQuery::new("entry").field_param("rating", json!({"stars": 4}));
        let err = hook().before_prepare(&mut query).unwrap_err();

        assert!(matches!(err, ForeignFieldError::UnknownFilterAttribute { .. }));
    }

    #[test]
    fn test_hook_merges_with_explicit_attach() {
        let mut query = ElementQuery::new("entry").field_param("rating", json!({"score": 5}));
        let outcome = attach_to(&mut query, &rating(), AttachOptions::eager_load()).unwrap();
        assert_eq!(outcome, AttachOutcome::Created);

        hook().before_prepare(&mut query).unwrap();
        let attachment = query.attachment(7).unwrap();
        assert!(attachment.enable_eager_load());
        assert!(attachment.enable_join());
        assert_eq!(query.attachments().count(), 1);
    }
}

//! Element capability and a plain in-memory element.
//!
//! The host store owns its elements; foreign fields only need a narrow view of
//! them: identity, site, whether the current save is a propagation, the nested
//! owner (for blocks living inside another element) and the current field values.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::ids::{ElementId, SiteId};

/// Type-erased field value as held by an element.
///
/// Field implementations downcast this to their own model type.
pub type FieldValue = Arc<dyn Any + Send + Sync>;

/// The view of a host element that foreign fields depend on.
pub trait Element: fmt::Debug + Send + Sync {
    /// Element id, `None` while the element has not been saved yet.
    fn id(&self) -> Option<ElementId>;

    /// The site this instance of the element belongs to.
    fn site_id(&self) -> SiteId;

    /// Whether the current save propagates from another site's save.
    fn is_propagating(&self) -> bool {
        false
    }

    /// The element this one is nested in, if it is a nested container
    /// (a block inside a matrix-like field, for instance).
    ///
    /// Top-level elements return `None`; root resolution stops there.
    fn nested_owner(&self) -> Option<Arc<dyn Element>> {
        None
    }

    /// The current value of the field with the given handle.
    fn field_value(&self, _handle: &str) -> Option<FieldValue> {
        None
    }
}

/// A plain element value, used by tests and by callers that do not have a
/// richer element type of their own.
#[derive(Clone, Default)]
pub struct ElementSnapshot {
    pub id: Option<ElementId>,
    pub site_id: SiteId,
    pub propagating: bool,
    pub owner: Option<Arc<dyn Element>>,
    field_values: HashMap<String, FieldValue>,
}

impl ElementSnapshot {
    /// Create a top-level element on the given site.
    pub fn new(id: ElementId, site_id: SiteId) -> Self {
        Self {
            id: Some(id),
            site_id,
            ..Self::default()
        }
    }

    /// Create an element that has not been saved yet.
    pub fn unsaved(site_id: SiteId) -> Self {
        Self {
            site_id,
            ..Self::default()
        }
    }

    /// Mark this element as nested inside `owner`.
    pub fn nested_in(mut self, owner: Arc<dyn Element>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Mark the current save as a propagation from another site.
    pub fn propagating(mut self, propagating: bool) -> Self {
        self.propagating = propagating;
        self
    }

    /// Set the value of a field.
    pub fn with_field_value<T: Any + Send + Sync>(mut self, handle: &str, value: T) -> Self {
        self.set_field_value(handle, value);
        self
    }

    /// Set the value of a field in place.
    pub fn set_field_value<T: Any + Send + Sync>(&mut self, handle: &str, value: T) {
        self.field_values
            .insert(handle.to_string(), Arc::new(value) as FieldValue);
    }
}

impl fmt::Debug for ElementSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handles: Vec<&String> = self.field_values.keys().collect();
        handles.sort();

        f.debug_struct("ElementSnapshot")
            .field("id", &self.id)
            .field("site_id", &self.site_id)
            .field("propagating", &self.propagating)
            .field("owner", &self.owner.as_ref().and_then(|owner| owner.id()))
            .field("fields", &handles)
            .finish()
    }
}

impl Element for ElementSnapshot {
    fn id(&self) -> Option<ElementId> {
        self.id
    }

    fn site_id(&self) -> SiteId {
        self.site_id
    }

    fn is_propagating(&self) -> bool {
        self.propagating
    }

    fn nested_owner(&self) -> Option<Arc<dyn Element>> {
        self.owner.clone()
    }

    fn field_value(&self, handle: &str) -> Option<FieldValue> {
        self.field_values.get(handle).cloned()
    }
}

//! Foreign field query extension.
//!
//! Decides per query and field whether the field's side table takes part in
//! the SQL, and applies that decision once when the query is prepared.
//!
//! - **Eager-load** adds a `field:<handle>` column holding the side row as a
//!   JSON object (or `NULL` when there is none).
//! - **Join** left-joins the side table on both the main query and the
//!   subquery; filters become `WHERE` predicates of the subquery only.
//!
//! Several callers may attach the same field to the same query; their
//! requests merge into one attachment.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use foreign_fields_shared::FieldDefinition;
use serde_json::Value;
use tracing::debug;

use super::builder::SelectBuilder;
use super::condition::Condition;
use super::dialect::Dialect;
use super::element_query::ElementQueryInterface;
use super::param::parse_param;
use crate::errors::ForeignFieldError;

/// Filter payload: record attribute to condition value.
pub type FilterMap = BTreeMap<String, Value>;

/// What a caller asks for when attaching a field to a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachOptions {
    pub filters: Option<FilterMap>,
    pub force_eager_load: bool,
    pub force_join: bool,
}

impl AttachOptions {
    pub fn with_filters(filters: Option<FilterMap>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    pub fn eager_load() -> Self {
        Self {
            force_eager_load: true,
            ..Self::default()
        }
    }

    pub fn join() -> Self {
        Self {
            force_join: true,
            ..Self::default()
        }
    }
}

/// Result of `attach_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The query type does not support attachments.
    Unsupported,
    /// Neither eager-load nor join is needed.
    NotRequired,
    Created,
    /// Merged into the field's existing attachment.
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Attached,
    Applied,
}

/// The side-table participation of one field in one query.
#[derive(Debug, Clone)]
pub struct QueryAttachment {
    field: Arc<FieldDefinition>,
    enable_eager_load: bool,
    enable_join: bool,
    filters: Option<FilterMap>,
    state: AttachmentState,
}

impl QueryAttachment {
    fn new(
        field: Arc<FieldDefinition>,
        enable_eager_load: bool,
        enable_join: bool,
        filters: Option<FilterMap>,
    ) -> Self {
        Self {
            field,
            enable_eager_load,
            enable_join,
            filters,
            state: AttachmentState::Attached,
        }
    }

    pub fn field(&self) -> &Arc<FieldDefinition> {
        &self.field
    }

    pub fn enable_eager_load(&self) -> bool {
        self.enable_eager_load
    }

    pub fn enable_join(&self) -> bool {
        self.enable_join
    }

    pub fn filters(&self) -> Option<&FilterMap> {
        self.filters.as_ref()
    }

    pub fn state(&self) -> AttachmentState {
        self.state
    }

    fn has_filters(&self) -> bool {
        self.filters.as_ref().is_some_and(|filters| !filters.is_empty())
    }

    fn merge(&mut self, enable_eager_load: bool, enable_join: bool, filters: Option<FilterMap>) {
        self.enable_eager_load |= enable_eager_load;
        self.enable_join |= enable_join;

        if let Some(filters) = filters {
            match &mut self.filters {
                Some(existing) => existing.extend(filters),
                None => self.filters = Some(filters),
            }
        }
    }

    /// Emits the join, filters and eager-load column. Runs once.
    pub(crate) fn apply(
        &mut self,
        is_count_query: bool,
        query: &mut SelectBuilder,
        sub_query: &mut SelectBuilder,
        dialect: Dialect,
    ) -> Result<(), ForeignFieldError> {
        let eager_load = self.enable_eager_load && (self.has_filters() || !is_count_query);

        if eager_load || self.enable_join {
            self.attach_join(query, sub_query)?;
        }
        if eager_load {
            query.select_as(json_expression(&self.field, dialect), self.field.eager_load_alias());
        }

        debug!(
            field = %self.field.handle,
            eager_load,
            join = eager_load || self.enable_join,
            "Applied foreign field attachment"
        );

        self.state = AttachmentState::Applied;
        Ok(())
    }

    fn attach_join(
        &self,
        query: &mut SelectBuilder,
        sub_query: &mut SelectBuilder,
    ) -> Result<(), ForeignFieldError> {
        let field = &self.field;
        let handle = &field.handle;

        let mut on = format!(
            "[[{handle}.elementId]] = [[elements.id]] AND [[{handle}.fieldId]] = {}",
            field.id
        );
        if field.per_site_records {
            on.push_str(&format!(" AND [[{handle}.siteId]] = [[elements_sites.siteId]]"));
        }

        query.left_join(&field.table_name, handle, Condition::raw(on.clone()));
        sub_query.left_join(&field.table_name, handle, Condition::raw(on));

        for (name, filter) in self.filters.iter().flatten() {
            let condition = parse_param(&format!("{handle}.{name}"), filter)
                .map_err(|e| ForeignFieldError::malformed_filter(handle, e.to_string()))?;
            if let Some(condition) = condition {
                sub_query.and_where(match field.attribute_type(name) {
                    Some(column_type) => condition.typed(column_type),
                    None => condition,
                });
            }
        }

        Ok(())
    }
}

/// Attaches `field` to `query`.
///
/// Eager-load is requested when the query's `with` list names the field (the
/// request is consumed) or `force_eager_load` is set. A join is requested by
/// `force_join`, by any filter, or when the handle occurs in the query's
/// ordering, grouping or conditions. Nothing is registered when neither is
/// requested; a second attach of the same field merges into the first.
pub fn attach_to(
    query: &mut dyn ElementQueryInterface,
    field: &Arc<FieldDefinition>,
    options: AttachOptions,
) -> Result<AttachOutcome, ForeignFieldError> {
    let element_type = query.element_type().to_string();
    let Some(query) = query.as_element_query_mut() else {
        debug!(field = %field.handle, %element_type, "Query does not support foreign fields");
        return Ok(AttachOutcome::Unsupported);
    };

    if let Some(filters) = &options.filters {
        check_filter_attributes(field, filters)?;
    }

    let has_filters = options
        .filters
        .as_ref()
        .is_some_and(|filters| !filters.is_empty());
    let enable_eager_load = query.take_with(&field.handle) || options.force_eager_load;
    let enable_join = references_handle(&query.referenced_strings(), &field.handle)
        || has_filters
        || options.force_join;

    if !enable_eager_load && !enable_join {
        return Ok(AttachOutcome::NotRequired);
    }

    match query.attachments_mut().entry(field.id) {
        Entry::Occupied(mut entry) => {
            entry
                .get_mut()
                .merge(enable_eager_load, enable_join, options.filters);
            debug!(field = %field.handle, enable_eager_load, enable_join, "Merged foreign field attachment");
            Ok(AttachOutcome::Merged)
        }
        Entry::Vacant(entry) => {
            entry.insert(QueryAttachment::new(
                field.clone(),
                enable_eager_load,
                enable_join,
                options.filters,
            ));
            debug!(field = %field.handle, enable_eager_load, enable_join, "Attached foreign field");
            Ok(AttachOutcome::Created)
        }
    }
}

/// Whether `handle` occurs in any of `strings`.
///
/// This is a plain substring test: a handle that is part of a longer
/// identifier (`rate` in `[[rating.score]]`) matches as well.
pub fn references_handle(strings: &[&str], handle: &str) -> bool {
    !handle.is_empty() && strings.iter().any(|s| s.contains(handle))
}

/// Validates a caller-supplied filter payload.
///
/// Empty payloads (`null`, `false`, `0`, `""`, `"0"`, `[]`, `{}`) mean no
/// filter. Anything else must be an object whose keys are record attributes
/// and whose values the parameter parser understands.
pub fn prepare_query_filter(
    field: &FieldDefinition,
    value: Option<&Value>,
) -> Result<Option<FilterMap>, ForeignFieldError> {
    let Some(value) = value.filter(|value| !is_empty_value(value)) else {
        return Ok(None);
    };

    let Value::Object(map) = value else {
        return Err(ForeignFieldError::malformed_filter(
            &field.handle,
            format!("the query value for the field {} must be a map", field.handle),
        ));
    };

    let filters: FilterMap = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    check_filter_attributes(field, &filters)?;

    for (name, filter) in &filters {
        parse_param(&format!("{}.{}", field.handle, name), filter)
            .map_err(|e| ForeignFieldError::malformed_filter(&field.handle, e.to_string()))?;
    }

    Ok(Some(filters))
}

fn check_filter_attributes(field: &FieldDefinition, filters: &FilterMap) -> Result<(), ForeignFieldError> {
    match filters.keys().find(|name| !field.is_record_attribute(name)) {
        Some(unknown) => Err(ForeignFieldError::unknown_filter_attribute(
            &field.handle,
            unknown.as_str(),
        )),
        None => Ok(()),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// The eager-load column: the side row as a JSON object, `NULL` without one.
pub fn json_expression(field: &FieldDefinition, dialect: Dialect) -> String {
    let handle = &field.handle;
    let pairs: Vec<String> = field
        .record_attributes
        .iter()
        .map(|attribute| {
            format!(
                "'{}', [[{handle}.{attribute}]]",
                attribute.replace('\'', "''")
            )
        })
        .collect();

    format!(
        "CASE WHEN [[{handle}.id]] IS NULL THEN NULL ELSE {}({}) END",
        dialect.json_object_fn(),
        pairs.join(", ")
    )
}

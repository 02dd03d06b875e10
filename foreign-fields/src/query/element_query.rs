//! Element queries.
//!
//! An `ElementQuery` collects the caller's criteria and turns them into two
//! builders when prepared: a subquery selecting the matching element/site rows
//! (filters, ordering and paging happen here) and a main query selecting the
//! columns of those rows. Foreign field attachments registered on the query
//! are applied to both builders exactly once, after the before-prepare hooks
//! have run.

use std::collections::BTreeMap;

use foreign_fields_shared::{FieldId, SiteId};
use serde_json::Value;
use tracing::debug;

use super::builder::{JoinKind, OrderBy, SelectBuilder};
use super::condition::Condition;
use super::dialect::Dialect;
use super::extension::{AttachmentState, QueryAttachment};
use super::hooks::QueryContext;
use crate::errors::ForeignFieldError;

/// Host table holding elements.
pub const ELEMENTS_TABLE: &str = "elements";

/// Host table holding the per-site rows of elements.
pub const ELEMENTS_SITES_TABLE: &str = "elements_sites";

/// Alias of the subquery inside the main query.
pub const SUBQUERY_ALIAS: &str = "subquery";

/// Select expression of a bare count query.
pub const COUNT_EXPRESSION: &str = "COUNT(*)";

const DEFAULT_SELECT: &[&str] = &[
    "[[elements.id]]",
    "[[elements.type]]",
    "[[elements_sites.siteId]]",
    "[[elements_sites.title]]",
];

/// Any query foreign fields may be attached to.
///
/// Only `ElementQuery` supports attachments; other implementations are
/// ignored by the extension engine.
pub trait ElementQueryInterface: Send {
    fn element_type(&self) -> &str;

    fn as_element_query_mut(&mut self) -> Option<&mut ElementQuery> {
        None
    }
}

/// Criteria of a query over elements of one type.
#[derive(Debug, Clone)]
pub struct ElementQuery {
    pub element_type: String,
    pub site_id: Option<SiteId>,
    pub select: Vec<String>,
    /// Eager-load requests, by field handle.
    pub with: Vec<String>,
    pub condition: Option<Condition>,
    pub order_by: Vec<OrderBy>,
    pub group_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub with_custom_fields: bool,
    field_params: BTreeMap<String, Value>,
    attachments: BTreeMap<FieldId, QueryAttachment>,
}

impl ElementQuery {
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            element_type: element_type.into(),
            site_id: None,
            select: Vec::new(),
            with: Vec::new(),
            condition: None,
            order_by: Vec::new(),
            group_by: Vec::new(),
            limit: None,
            offset: None,
            with_custom_fields: true,
            field_params: BTreeMap::new(),
            attachments: BTreeMap::new(),
        }
    }

    pub fn site(mut self, site_id: SiteId) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Request eager-loading of the field with `handle`.
    pub fn with(mut self, handle: impl Into<String>) -> Self {
        self.with.push(handle.into());
        self
    }

    /// Add a condition, combined with existing ones by `AND`.
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            None => condition,
            Some(Condition::And(mut conditions)) => {
                conditions.push(condition);
                Condition::And(conditions)
            }
            Some(existing) => Condition::And(vec![existing, condition]),
        });
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn group_by(mut self, expression: impl Into<String>) -> Self {
        self.group_by.push(expression.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_custom_fields(mut self, enabled: bool) -> Self {
        self.with_custom_fields = enabled;
        self
    }

    /// Set the declarative parameter of the field with `handle`.
    ///
    /// For foreign fields this is a filter payload picked up by
    /// `ForeignFieldFilterHook` when the query is prepared.
    pub fn field_param(mut self, handle: impl Into<String>, value: Value) -> Self {
        self.field_params.insert(handle.into(), value);
        self
    }

    pub fn get_field_param(&self, handle: &str) -> Option<&Value> {
        self.field_params.get(handle)
    }

    /// Turn this into a bare `COUNT(*)` query.
    pub fn count(mut self) -> Self {
        self.select = vec![COUNT_EXPRESSION.to_string()];
        self.order_by.clear();
        self
    }

    /// Whether the query only selects a row count.
    pub fn is_count_query(&self) -> bool {
        self.select.len() == 1 && self.select[0] == COUNT_EXPRESSION
    }

    pub fn attachment(&self, field_id: FieldId) -> Option<&QueryAttachment> {
        self.attachments.get(&field_id)
    }

    pub fn attachments(&self) -> impl Iterator<Item = &QueryAttachment> {
        self.attachments.values()
    }

    pub(crate) fn attachments_mut(&mut self) -> &mut BTreeMap<FieldId, QueryAttachment> {
        &mut self.attachments
    }

    /// Remove `handle` from the eager-load requests, reporting whether it was there.
    pub(crate) fn take_with(&mut self, handle: &str) -> bool {
        let before = self.with.len();
        self.with.retain(|requested| requested != handle);
        self.with.len() != before
    }

    /// Strings of the `order by`, `group by` and `where` parts.
    pub(crate) fn referenced_strings(&self) -> Vec<&str> {
        let mut strings: Vec<&str> = self
            .order_by
            .iter()
            .map(|order| order.expression.as_str())
            .chain(self.group_by.iter().map(String::as_str))
            .collect();

        if let Some(condition) = &self.condition {
            condition.collect_strings(&mut strings);
        }

        strings.retain(|s| !s.is_empty());
        strings
    }

    /// Runs the before-prepare hooks, builds the SQL builders and applies every
    /// foreign field attachment.
    pub fn prepare(mut self, context: &QueryContext) -> Result<PreparedQuery, ForeignFieldError> {
        for hook in context.hooks() {
            hook.before_prepare(&mut self)?;
        }

        let is_count = self.is_count_query();
        let dialect = context.dialect();

        let mut sub_query = SelectBuilder::new();
        sub_query
            .select_as("[[elements.id]]", "elementsId")
            .select_as("[[elements_sites.id]]", "siteSettingsId")
            .from_table(ELEMENTS_TABLE, "elements")
            .join(
                JoinKind::Inner,
                ELEMENTS_SITES_TABLE,
                "elements_sites",
                Condition::raw("[[elements_sites.elementId]] = [[elements.id]]"),
            )
            .and_where(Condition::eq("elements.type", self.element_type.clone()));
        if let Some(site_id) = self.site_id {
            sub_query.and_where(Condition::eq("elements_sites.siteId", site_id));
        }
        if let Some(condition) = self.condition.take() {
            sub_query.and_where(condition);
        }
        for order in &self.order_by {
            sub_query.order_by(order.clone());
        }
        sub_query.limit(self.limit).offset(self.offset);

        let mut query = SelectBuilder::new();
        if self.select.is_empty() {
            for column in DEFAULT_SELECT {
                query.select(*column);
            }
        } else {
            for column in &self.select {
                query.select(column.clone());
            }
        }
        query
            .join(
                JoinKind::Inner,
                ELEMENTS_TABLE,
                "elements",
                Condition::raw(format!("[[elements.id]] = [[{SUBQUERY_ALIAS}.elementsId]]")),
            )
            .join(
                JoinKind::Inner,
                ELEMENTS_SITES_TABLE,
                "elements_sites",
                Condition::raw(format!(
                    "[[elements_sites.id]] = [[{SUBQUERY_ALIAS}.siteSettingsId]]"
                )),
            );
        for expression in &self.group_by {
            query.group_by(expression.clone());
        }
        for order in &self.order_by {
            query.order_by(order.clone());
        }

        let mut attachments: Vec<QueryAttachment> =
            std::mem::take(&mut self.attachments).into_values().collect();
        for attachment in &mut attachments {
            if attachment.state() == AttachmentState::Attached {
                attachment.apply(is_count, &mut query, &mut sub_query, dialect)?;
            }
        }

        debug!(
            element_type = %self.element_type,
            attachments = attachments.len(),
            "Prepared element query"
        );

        Ok(PreparedQuery {
            query,
            sub_query,
            dialect,
            attachments,
        })
    }
}

impl ElementQueryInterface for ElementQuery {
    fn element_type(&self) -> &str {
        &self.element_type
    }

    fn as_element_query_mut(&mut self) -> Option<&mut ElementQuery> {
        Some(self)
    }
}

/// The builders of a prepared element query.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    query: SelectBuilder,
    sub_query: SelectBuilder,
    dialect: Dialect,
    attachments: Vec<QueryAttachment>,
}

impl PreparedQuery {
    pub fn query(&self) -> &SelectBuilder {
        &self.query
    }

    pub fn sub_query(&self) -> &SelectBuilder {
        &self.sub_query
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The attachments as applied, in field id order.
    pub fn attachments(&self) -> &[QueryAttachment] {
        &self.attachments
    }

    /// Renders the main query with the subquery nested in its `FROM`.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut query = self.query.clone();
        query.from_subquery(self.sub_query.clone(), SUBQUERY_ALIAS);
        query.to_sql(self.dialect)
    }
}

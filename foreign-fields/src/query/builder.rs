//! A small `SELECT` builder.
//!
//! Expressions in select lists, join conditions, grouping and ordering are
//! raw fragments and may use `[[column]]` / `{{table}}` markers; values in
//! `Condition`s are bound as parameters in rendering order.

use serde_json::Value;

use super::condition::Condition;
use super::dialect::Dialect;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub expression: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    Table { name: String, alias: String },
    Subquery { query: Box<SelectBuilder>, alias: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub on: Condition,
}

/// One `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub expression: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            descending: false,
        }
    }

    pub fn desc(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectBuilder {
    select: Vec<SelectColumn>,
    from: Option<FromSource>,
    joins: Vec<Join>,
    conditions: Vec<Condition>,
    group_by: Vec<String>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, expression: impl Into<String>) -> &mut Self {
        self.select.push(SelectColumn {
            expression: expression.into(),
            alias: None,
        });
        self
    }

    pub fn select_as(&mut self, expression: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        self.select.push(SelectColumn {
            expression: expression.into(),
            alias: Some(alias.into()),
        });
        self
    }

    pub fn from_table(&mut self, name: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        self.from = Some(FromSource::Table {
            name: name.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn from_subquery(&mut self, query: SelectBuilder, alias: impl Into<String>) -> &mut Self {
        self.from = Some(FromSource::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        });
        self
    }

    pub fn join(
        &mut self,
        kind: JoinKind,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: Condition,
    ) -> &mut Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            alias: alias.into(),
            on,
        });
        self
    }

    pub fn left_join(
        &mut self,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: Condition,
    ) -> &mut Self {
        self.join(JoinKind::Left, table, alias, on)
    }

    pub fn and_where(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn group_by(&mut self, expression: impl Into<String>) -> &mut Self {
        self.group_by.push(expression.into());
        self
    }

    pub fn order_by(&mut self, order: OrderBy) -> &mut Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.limit = limit;
        self
    }

    pub fn offset(&mut self, offset: Option<u64>) -> &mut Self {
        self.offset = offset;
        self
    }

    pub fn select_columns(&self) -> &[SelectColumn] {
        &self.select
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Renders the query and its bound values.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.write_sql(dialect, &mut params);
        (sql, params)
    }

    fn write_sql(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let mut sql = String::from("SELECT ");

        if self.select.is_empty() {
            sql.push('*');
        } else {
            let columns: Vec<String> = self
                .select
                .iter()
                .map(|column| match &column.alias {
                    Some(alias) => format!(
                        "{} AS {}",
                        dialect.quote_sql(&column.expression),
                        dialect.quote_ident(alias)
                    ),
                    None => dialect.quote_sql(&column.expression),
                })
                .collect();
            sql.push_str(&columns.join(", "));
        }

        match &self.from {
            Some(FromSource::Table { name, alias }) => {
                sql.push_str(&format!(
                    " FROM {} {}",
                    dialect.quote_table(name),
                    dialect.quote_ident(alias)
                ));
            }
            Some(FromSource::Subquery { query, alias }) => {
                let inner = query.write_sql(dialect, params);
                sql.push_str(&format!(" FROM ({}) {}", inner, dialect.quote_ident(alias)));
            }
            None => {}
        }

        for join in &self.joins {
            let keyword = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            let on = join.on.to_sql(dialect, params);
            sql.push_str(&format!(
                " {} {} {} ON {}",
                keyword,
                dialect.quote_table(&join.table),
                dialect.quote_ident(&join.alias),
                on
            ));
        }

        if !self.conditions.is_empty() {
            let parts: Vec<String> = self
                .conditions
                .iter()
                .map(|condition| condition.to_sql(dialect, params))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }

        if !self.group_by.is_empty() {
            let parts: Vec<String> = self
                .group_by
                .iter()
                .map(|expression| dialect.quote_sql(expression))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&parts.join(", "));
        }

        if !self.order_by.is_empty() {
            let parts: Vec<String> = self
                .order_by
                .iter()
                .map(|order| {
                    format!(
                        "{} {}",
                        dialect.quote_sql(&order.expression),
                        if order.descending { "DESC" } else { "ASC" }
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }
}
